//! Outbound leg of the sync bridge.
//!
//! Consumes lifecycle events and pushes changed syncable fields to the
//! linked tracker issue. Changes that arrived *from* the tracker carry the
//! `tracker_status_sync` ledger tag and are never pushed back out.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use incident::{
    requires_report, ChangedField, EventType, Features, Incident, IncidentStore, LifecycleEvent,
    LifecycleHandler, TrackerTicket,
};

use crate::client::{FieldUpdate, NewIssue, TrackerApi};
use crate::error::SyncError;
use crate::workflow::{external_target, tracker_priority, WorkflowGraph};

/// Fields mirrored to the tracker when they change.
const SYNCABLE: [ChangedField; 5] = [
    ChangedField::Title,
    ChangedField::Description,
    ChangedField::Priority,
    ChangedField::Status,
    ChangedField::Commander,
];

/// Outbound synchronization bridge, registered as a lifecycle handler.
pub struct SyncBridge {
    api: Arc<dyn TrackerApi>,
    store: IncidentStore,
    graph: WorkflowGraph,
    features: Features,
    project: String,
}

impl SyncBridge {
    #[must_use]
    pub fn new(
        api: Arc<dyn TrackerApi>,
        store: IncidentStore,
        graph: WorkflowGraph,
        features: Features,
        project: impl Into<String>,
    ) -> Self {
        Self {
            api,
            store,
            graph,
            features,
            project: project.into(),
        }
    }

    /// Create the mirror ticket for an incident not yet linked.
    async fn create_ticket(&self, incident: &Incident) -> Result<TrackerTicket, SyncError> {
        let priority = tracker_priority(incident.priority);
        let created = self
            .api
            .create_issue(&NewIssue {
                project: self.project.clone(),
                issue_type: "Incident".to_string(),
                summary: incident.title.clone(),
                description: incident.description.clone(),
                priority: priority.to_string(),
                impact: Some(incident.environment.as_str().to_string()),
                category: Some(incident.category.clone()),
            })
            .await?;
        info!(
            incident_id = %incident.id,
            issue = %created.key,
            "Tracker ticket created on first outward sync"
        );

        // Watcher subscription is best-effort.
        let watcher = incident.commander.as_deref().unwrap_or(&incident.creator);
        if let Err(e) = self.api.add_watcher(&created.key, watcher).await {
            warn!(issue = %created.key, watcher, error = %e, "Failed to add watcher");
        }

        let ticket = TrackerTicket {
            incident_id: incident.id,
            external_id: created.id,
            external_key: created.key,
            summary: incident.title.clone(),
            description: incident.description.clone(),
            tracker_priority: priority.to_string(),
            impact: incident.environment.as_str().to_string(),
            external_status: "Open".to_string(),
            reporter: Some(incident.creator.clone()),
        };
        if self.store.set_ticket(ticket.clone()).await.is_err() {
            warn!(incident_id = %incident.id, "Incident vanished while linking ticket");
        }
        Ok(ticket)
    }

    /// Walk the external workflow from the ticket's last known state to the
    /// mapped target, one named transition at a time.
    async fn walk_to(&self, ticket: &mut TrackerTicket, target: &str) -> Result<(), SyncError> {
        let path = self.graph.shortest_path(&ticket.external_status, target)?;
        for name in path {
            let options = self.api.available_transitions(&ticket.external_key).await?;
            let option = options
                .into_iter()
                .find(|t| t.name == name)
                .ok_or_else(|| SyncError::TransitionUnavailable(name.clone()))?;
            self.api
                .perform_transition(&ticket.external_key, &option.id)
                .await?;
            debug!(issue = %ticket.external_key, transition = %name, "Tracker transition applied");
        }
        ticket.external_status = target.to_string();
        Ok(())
    }

    async fn sync_event(&self, event: &LifecycleEvent) -> Result<(), SyncError> {
        let mut ticket = match self.store.ticket(event.incident.id).await {
            Ok(Some(ticket)) => ticket,
            Ok(None) => self.create_ticket(&event.incident).await?,
            Err(_) => {
                debug!(incident_id = %event.incident.id, "Incident gone, skipping sync");
                return Ok(());
            }
        };

        let changed: Vec<ChangedField> = event
            .changed
            .iter()
            .copied()
            .filter(|f| SYNCABLE.contains(f))
            .collect();
        if changed.is_empty() {
            return Ok(());
        }

        let incident = &event.incident;
        let mut fields = FieldUpdate::default();
        if changed.contains(&ChangedField::Title) {
            fields.summary = Some(incident.title.clone());
            ticket.summary.clone_from(&incident.title);
        }
        if changed.contains(&ChangedField::Description) {
            fields.description = Some(incident.description.clone());
            ticket.description.clone_from(&incident.description);
        }
        if changed.contains(&ChangedField::Priority) {
            let name = tracker_priority(incident.priority);
            fields.priority = Some(name.to_string());
            ticket.tracker_priority = name.to_string();
        }
        if changed.contains(&ChangedField::Commander) {
            fields.assignee = incident.commander.clone();
        }

        if !fields.is_empty() {
            self.api.update_fields(&ticket.external_key, &fields).await?;
        }

        if changed.contains(&ChangedField::Status) {
            let needs_report = requires_report(incident, &self.features);
            if let Some(target) = external_target(incident.status, needs_report) {
                if target != ticket.external_status {
                    self.walk_to(&mut ticket, target).await?;
                }
            } else {
                // Report-mandated incidents keep the ticket open until
                // internal close.
                debug!(
                    issue = %ticket.external_key,
                    status = %incident.status,
                    "No external target for status, ticket left as-is"
                );
            }
        }

        let key = ticket.external_key.clone();
        if self.store.set_ticket(ticket).await.is_err() {
            warn!(incident_id = %incident.id, "Incident vanished while syncing ticket mirror");
        }

        info!(
            incident_id = %incident.id,
            issue = %key,
            changed = changed.len(),
            "Outbound tracker sync completed"
        );
        Ok(())
    }
}

#[async_trait]
impl LifecycleHandler for SyncBridge {
    fn name(&self) -> &'static str {
        "tracker-sync"
    }

    async fn handle(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
        if !self.features.tracker_sync {
            return Ok(());
        }
        // Loop suppression: never propagate a change back in the direction
        // it came from.
        if event.update.event_type == EventType::TrackerStatusSync {
            debug!(
                incident_id = %event.incident.id,
                "Update originated from the tracker, outbound sync skipped"
            );
            return Ok(());
        }
        self.sync_event(event).await?;
        Ok(())
    }
}
