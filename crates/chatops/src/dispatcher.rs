//! Notification dispatcher: turns lifecycle events into chat messages.
//!
//! Runs last in the handler order so its messages can reference report
//! links the orchestrator created moments earlier.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use incident::{
    enabled_backends, ChangedField, Features, Incident, IncidentStore, Ledger, LifecycleEvent,
    LifecycleHandler, Priority, Status,
};

use crate::channel::{ChannelTarget, ChatMessage, ChatSink, Severity};

/// Posts status updates, global mirrors, and key-event prompts.
pub struct NotificationDispatcher {
    chat: Arc<dyn ChatSink>,
    store: IncidentStore,
    ledger: Ledger,
    features: Features,
}

impl NotificationDispatcher {
    #[must_use]
    pub fn new(chat: Arc<dyn ChatSink>, store: IncidentStore, features: Features) -> Self {
        let ledger = Ledger::new(store.clone());
        Self {
            chat,
            store,
            ledger,
            features,
        }
    }

    /// Whether this incident's updates are mirrored to the global channel.
    ///
    /// High-priority production incidents only; the global channel is a
    /// summary surface, not a firehose.
    fn mirrors_globally(incident: &Incident) -> bool {
        matches!(incident.priority, Priority::P1 | Priority::P2)
            && incident.environment.is_production()
    }

    fn status_message(event: &LifecycleEvent) -> ChatMessage {
        let incident = &event.incident;
        let title = format!(
            "[{}] {} is now {}",
            incident.priority, incident.title, incident.status
        );
        let mut body = event.update.message.clone();
        if body.is_empty() {
            body = format!(
                "Status changed by {}",
                event.update.actor.as_deref().unwrap_or("system")
            );
        }
        ChatMessage {
            target: ChannelTarget::Incident(incident.id),
            title,
            body,
            severity: Severity::for_priority(incident.priority),
        }
    }

    /// Relay a tracker comment into the incident channel. Comment webhooks
    /// never reach the engine; this is their only surface.
    pub async fn relay_tracker_comment(
        &self,
        issue_key: &str,
        author: &str,
        body: &str,
    ) -> anyhow::Result<()> {
        let Some(incident) = self.store.find_by_ticket_key(issue_key).await else {
            debug!(issue = %issue_key, "Tracker comment for unlinked issue, dropped");
            return Ok(());
        };
        self.chat
            .post(&ChatMessage {
                target: ChannelTarget::Incident(incident.id),
                title: format!("Tracker comment from {author} on {issue_key}"),
                body: body.to_string(),
                severity: Severity::Info,
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl LifecycleHandler for NotificationDispatcher {
    fn name(&self) -> &'static str {
        "notifications"
    }

    async fn handle(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
        let incident = &event.incident;

        let mut message = Self::status_message(event);
        if !event.changed(ChangedField::Status) {
            message.title = format!("[{}] {} updated", incident.priority, incident.title);
        }
        self.chat.post(&message).await?;

        if Self::mirrors_globally(incident) && event.changed(ChangedField::Status) {
            self.chat
                .post(&ChatMessage {
                    target: ChannelTarget::Global,
                    title: message.title.clone(),
                    body: format!("{} environment, category {}", incident.environment.as_str(), incident.category),
                    severity: Severity::for_priority(incident.priority),
                })
                .await?;
        }

        // Key-events prompt: mitigation reached but the timeline is still
        // missing required milestones.
        if event.changed(ChangedField::Status)
            && incident.status.is_mitigated()
            && incident.status != Status::Closed
        {
            let missing = self.ledger.missing_required_milestones(incident.id).await?;
            if !missing.is_empty() {
                let names: Vec<&str> = missing.iter().map(|m| m.as_str()).collect();
                self.chat
                    .post(&ChatMessage {
                        target: ChannelTarget::Incident(incident.id),
                        title: "Key events still missing".to_string(),
                        body: format!(
                            "Record the following milestones before closing: {}",
                            names.join(", ")
                        ),
                        severity: Severity::Warning,
                    })
                    .await?;
            }
        }

        // Closure recap, including where the report ended up.
        if incident.status == Status::Closed && event.changed(ChangedField::Status) {
            let mut lines = Vec::new();
            if let Some(reason) = incident.closure_reason {
                lines.push(format!("Closed early: {}", reason.as_str()));
            }
            for backend in enabled_backends(&self.features) {
                if let Ok(Some(link)) = self.store.report_link(incident.id, backend).await {
                    lines.push(format!(
                        "Report ({backend}): {}",
                        link.url.as_deref().unwrap_or(&link.external_id)
                    ));
                }
            }
            if !lines.is_empty() {
                self.chat
                    .post(&ChatMessage {
                        target: ChannelTarget::Incident(incident.id),
                        title: format!("{} closed", incident.title),
                        body: lines.join("\n"),
                        severity: Severity::Info,
                    })
                    .await?;
            }
        }

        Ok(())
    }
}
