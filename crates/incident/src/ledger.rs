//! Closability facts derived from the append-only update ledger.
//!
//! The ledger itself lives in the store (entries are appended atomically
//! with the incident mutation they describe); this module answers the two
//! questions the engine and the UI ask of it: which required milestones are
//! still missing, and whether the incident can close right now.

use async_trait::async_trait;

use crate::config::Features;
use crate::error::{CloseBlocker, StoreError};
use crate::model::{Incident, IncidentId, Milestone, ReportBackendKind, ReportLink, Update};
use crate::store::IncidentStore;

/// Backend-specific probe for "is the post-incident report finished".
///
/// Implemented by the report backends; the ledger only sees the seam. A
/// probe failure is *not* a closability verdict, it becomes a distinct
/// "status unknown" blocker.
#[async_trait]
pub trait ReportReadiness: Send + Sync {
    /// Whether the report behind `link` is marked ready on its backend.
    async fn is_ready(&self, link: &ReportLink) -> Result<bool, ReadinessProbeError>;
}

/// Failure while probing report readiness.
#[derive(Debug, thiserror::Error)]
#[error("readiness probe failed: {0}")]
pub struct ReadinessProbeError(pub String);

/// Whether the incident mandates a post-incident report.
///
/// Priority flag AND production environment AND at least one report backend
/// enabled.
#[must_use]
pub fn requires_report(incident: &Incident, features: &Features) -> bool {
    incident.priority.requires_report()
        && incident.environment.is_production()
        && features.any_report_backend()
}

/// Read-side view over the update ledger.
#[derive(Debug, Clone)]
pub struct Ledger {
    store: IncidentStore,
}

impl Ledger {
    #[must_use]
    pub fn new(store: IncidentStore) -> Self {
        Self { store }
    }

    /// Required milestone definitions lacking a corresponding ledger entry.
    pub async fn missing_required_milestones(
        &self,
        id: IncidentId,
    ) -> Result<Vec<Milestone>, StoreError> {
        let mut missing = Vec::new();
        for milestone in Milestone::required() {
            if !self.store.milestone_recorded(id, *milestone).await? {
                missing.push(*milestone);
            }
        }
        Ok(missing)
    }

    /// Ordered ledger for display and export callers, oldest first.
    pub async fn timeline(&self, id: IncidentId) -> Result<Vec<Update>, StoreError> {
        self.store.updates(id).await
    }

    /// Whether the incident can close now, with the blockers if not.
    ///
    /// An early close (pre-mitigation) with a supplied reason bypasses the
    /// milestone and report checks entirely; that is the whole point of the
    /// closure reason.
    pub async fn is_closable(
        &self,
        incident: &Incident,
        reason_supplied: bool,
        features: &Features,
        readiness: &dyn ReportReadiness,
    ) -> Result<(bool, Vec<CloseBlocker>), StoreError> {
        if !incident.status.is_mitigated() {
            if reason_supplied {
                return Ok((true, Vec::new()));
            }
            return Ok((false, vec![CloseBlocker::NotMitigated]));
        }

        let mut blockers = Vec::new();

        for milestone in self.missing_required_milestones(incident.id).await? {
            blockers.push(CloseBlocker::MissingMilestone(milestone));
        }

        if requires_report(incident, features) {
            for backend in enabled_backends(features) {
                match self.store.report_link(incident.id, backend).await? {
                    None => blockers.push(CloseBlocker::ReportMissing(backend)),
                    Some(link) => match readiness.is_ready(&link).await {
                        Ok(true) => {}
                        Ok(false) => blockers.push(CloseBlocker::ReportNotReady(backend)),
                        Err(e) => {
                            tracing::warn!(
                                incident_id = %incident.id,
                                backend = %backend,
                                error = %e,
                                "Report readiness probe failed"
                            );
                            blockers.push(CloseBlocker::ReportStatusUnknown(backend));
                        }
                    },
                }
            }
        }

        Ok((blockers.is_empty(), blockers))
    }
}

/// Report backends enabled by configuration, in orchestration order.
#[must_use]
pub fn enabled_backends(features: &Features) -> Vec<ReportBackendKind> {
    let mut backends = Vec::new();
    if features.wiki_reports {
        backends.push(ReportBackendKind::Wiki);
    }
    if features.tracker_reports {
        backends.push(ReportBackendKind::Tracker);
    }
    backends
}
