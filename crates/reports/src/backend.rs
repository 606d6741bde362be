//! The report backend seam.

use async_trait::async_trait;

use incident::{Incident, ReportBackendKind, ReportLink, Update};

use crate::error::ReportError;

/// Handle returned by a backend after creating a report artifact.
#[derive(Debug, Clone)]
pub struct CreatedReport {
    /// Backend-side identifier (page id or issue key)
    pub external_id: String,
    /// Browse URL, when the backend returns one
    pub url: Option<String>,
}

/// A system that can host a post-incident report.
///
/// `create` builds the initial skeleton artifact; `is_ready` answers
/// whether the report has since been finished on the backend's side.
#[async_trait]
pub trait ReportBackend: Send + Sync {
    /// Which backend this is; at most one report link exists per kind.
    fn kind(&self) -> ReportBackendKind;

    /// Create the report skeleton for an incident. The timeline is the
    /// incident's ledger, oldest entry first.
    async fn create(
        &self,
        incident: &Incident,
        timeline: &[Update],
    ) -> Result<CreatedReport, ReportError>;

    /// Whether the report behind `link` is finished.
    async fn is_ready(&self, link: &ReportLink) -> Result<bool, ReportError>;
}
