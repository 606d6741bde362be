//! Tracker report backend.
//!
//! Hosts the post-incident report as a dedicated issue in the external
//! tracker, linked to the incident's mirror ticket when one exists. The
//! report counts as ready once the issue reaches a terminal workflow state.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use incident::{Incident, IncidentStore, ReportBackendKind, ReportLink, Update};
use tracker_sync::{tracker_priority, NewIssue, TrackerApi};

use crate::backend::{CreatedReport, ReportBackend};
use crate::error::ReportError;

/// Workflow states in which a report issue counts as finished.
const READY_STATES: &[&str] = &["Resolved", "Closed", "Done"];

/// Report backend creating post-mortem issues in the tracker.
pub struct TrackerReportBackend {
    api: Arc<dyn TrackerApi>,
    store: IncidentStore,
    project: String,
}

impl TrackerReportBackend {
    #[must_use]
    pub fn new(api: Arc<dyn TrackerApi>, store: IncidentStore, project: impl Into<String>) -> Self {
        Self {
            api,
            store,
            project: project.into(),
        }
    }
}

#[async_trait]
impl ReportBackend for TrackerReportBackend {
    fn kind(&self) -> ReportBackendKind {
        ReportBackendKind::Tracker
    }

    async fn create(
        &self,
        incident: &Incident,
        timeline: &[Update],
    ) -> Result<CreatedReport, ReportError> {
        debug!(incident_id = %incident.id, project = %self.project, "Creating report issue");
        let created = self
            .api
            .create_issue(&NewIssue {
                project: self.project.clone(),
                issue_type: "Post-mortem".to_string(),
                summary: format!("Post-incident report: {}", incident.title),
                description: render_description(incident, timeline),
                priority: tracker_priority(incident.priority).to_string(),
                impact: Some(incident.environment.as_str().to_string()),
                category: Some(incident.category.clone()),
            })
            .await?;

        // Linking is best-effort; the report exists either way.
        if let Ok(Some(ticket)) = self.store.ticket(incident.id).await {
            if let Err(e) = self
                .api
                .link_issues("Relates", &created.key, &ticket.external_key)
                .await
            {
                warn!(
                    incident_id = %incident.id,
                    report = %created.key,
                    ticket = %ticket.external_key,
                    error = %e,
                    "Failed to link report issue to incident ticket"
                );
            }
        }

        Ok(CreatedReport {
            external_id: created.key,
            url: created.url,
        })
    }

    async fn is_ready(&self, link: &ReportLink) -> Result<bool, ReportError> {
        let status = self.api.issue_status(&link.external_id).await?;
        Ok(READY_STATES.iter().any(|s| s.eq_ignore_ascii_case(&status)))
    }
}

fn render_description(incident: &Incident, timeline: &[Update]) -> String {
    let mut body = format!(
        "h2. Summary\n{}\n\nh2. Facts\n* Priority: {}\n* Environment: {}\n* Category: {}\n",
        incident.description,
        incident.priority,
        incident.environment.as_str(),
        incident.category,
    );

    body.push_str("\nh2. Timeline\n");
    for entry in timeline {
        let label = entry.milestone.map_or_else(
            || {
                entry
                    .new_status
                    .map_or_else(|| entry.event_type.as_str().to_string(), |s| s.to_string())
            },
            |m| m.to_string(),
        );
        body.push_str(&format!(
            "* {} - {}\n",
            entry.created_at.format("%Y-%m-%d %H:%M UTC"),
            label
        ));
    }

    body.push_str("\nh2. Root cause\n_To be written._\n\nh2. Action items\n_To be written._\n");
    body
}
