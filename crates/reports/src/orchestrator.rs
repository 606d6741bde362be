//! Report orchestration.
//!
//! Lifecycle handler ensuring that every incident mandating a report gets
//! exactly one report artifact per enabled backend. Creation is
//! check-then-create with the store's unique insert as the arbiter, so a
//! racing duplicate resolves to success-by-detection: the loser logs the
//! surviving link and moves on. Backend failures are isolated; one backend
//! being down never blocks the others.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use chatops::{ChannelTarget, ChatMessage, ChatSink, Severity};
use incident::{
    enabled_backends, requires_report, ChangedField, Features, Incident, IncidentStore,
    LifecycleEvent, LifecycleHandler, ReportLink, Status,
};

use crate::backend::ReportBackend;

/// Creates report artifacts in response to lifecycle events.
pub struct ReportOrchestrator {
    store: IncidentStore,
    features: Features,
    backends: Vec<Arc<dyn ReportBackend>>,
    chat: Arc<dyn ChatSink>,
}

impl ReportOrchestrator {
    #[must_use]
    pub fn new(
        store: IncidentStore,
        features: Features,
        backends: Vec<Arc<dyn ReportBackend>>,
        chat: Arc<dyn ChatSink>,
    ) -> Self {
        Self {
            store,
            features,
            backends,
            chat,
        }
    }

    /// Ensure a report link exists for every enabled backend.
    ///
    /// Safe to call repeatedly; backends with an existing link are skipped.
    pub async fn ensure_reports(&self, incident: &Incident) {
        let timeline = match self.store.updates(incident.id).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!(incident_id = %incident.id, error = %e, "Ledger read failed, reports skipped");
                return;
            }
        };

        for kind in enabled_backends(&self.features) {
            let Some(backend) = self.backends.iter().find(|b| b.kind() == kind) else {
                warn!(backend = %kind, "Backend enabled but not wired");
                continue;
            };

            match self.store.report_link(incident.id, kind).await {
                Ok(Some(_)) => {
                    debug!(incident_id = %incident.id, backend = %kind, "Report already linked");
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(incident_id = %incident.id, backend = %kind, error = %e, "Link lookup failed");
                    continue;
                }
            }

            let created = match backend.create(incident, &timeline).await {
                Ok(created) => created,
                Err(e) => {
                    warn!(
                        incident_id = %incident.id,
                        backend = %kind,
                        error = %e,
                        "Report creation failed"
                    );
                    continue;
                }
            };

            let link = ReportLink {
                incident_id: incident.id,
                backend: kind,
                external_id: created.external_id,
                url: created.url,
                created_at: Utc::now(),
                created_by: None,
            };
            match self.store.insert_report_link(link).await {
                Ok(Ok(link)) => {
                    info!(
                        incident_id = %incident.id,
                        backend = %kind,
                        external_id = %link.external_id,
                        "Report created and linked"
                    );
                    self.announce(incident, &link).await;
                }
                Ok(Err(existing)) => {
                    // A concurrent creator won the insert; their artifact is
                    // the report of record.
                    info!(
                        incident_id = %incident.id,
                        backend = %kind,
                        external_id = %existing.0.external_id,
                        "Report link already present, keeping existing"
                    );
                }
                Err(e) => {
                    warn!(incident_id = %incident.id, backend = %kind, error = %e, "Link insert failed");
                }
            }
        }
    }

    /// Prompt for mitigation follow-ups when no report is mandated.
    async fn post_next_actions(&self, incident: &Incident) {
        let message = ChatMessage {
            target: ChannelTarget::Incident(incident.id),
            title: format!("Next actions for {}", incident.title),
            body: "Impact is stopped. Record the remaining key events, then close the incident."
                .to_string(),
            severity: Severity::Info,
        };
        if let Err(e) = self.chat.post(&message).await {
            warn!(incident_id = %incident.id, error = %e, "Next-actions prompt failed");
        }
    }

    async fn announce(&self, incident: &Incident, link: &ReportLink) {
        let message = ChatMessage {
            target: ChannelTarget::Incident(incident.id),
            title: format!("Post-incident report started ({})", link.backend),
            body: format!(
                "Skeleton created: {}. Fill in root cause and action items before closing.",
                link.url.as_deref().unwrap_or(&link.external_id)
            ),
            severity: Severity::Info,
        };
        if let Err(e) = self.chat.post(&message).await {
            warn!(incident_id = %incident.id, error = %e, "Report announcement failed");
        }
    }
}

#[async_trait]
impl LifecycleHandler for ReportOrchestrator {
    fn name(&self) -> &'static str {
        "reports"
    }

    async fn handle(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
        if !event.changed(ChangedField::Status) {
            return Ok(());
        }
        let incident = &event.incident;
        if !matches!(incident.status, Status::Mitigated | Status::PostMortem) {
            return Ok(());
        }
        if requires_report(incident, &self.features) {
            self.ensure_reports(incident).await;
        } else if incident.status == Status::Mitigated {
            self.post_next_actions(incident).await;
        }
        Ok(())
    }
}
