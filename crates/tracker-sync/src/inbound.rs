//! Inbound leg of the sync bridge: tracker webhooks.
//!
//! Payloads are parsed strictly for structure (missing required keys are a
//! validation error) but leniently for content: changed fields we do not
//! recognize are ignored so tracker schema drift never breaks the webhook.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use incident::{LifecycleEngine, TransitionRequest, Update};

use crate::error::SyncError;
use crate::workflow::{internal_priority, internal_target};

/// Issue reference carried by every webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueRef {
    pub id: String,
    pub key: String,
}

/// One changed field in an issue-updated event.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangelogItem {
    pub field: String,
    #[serde(rename = "fromString", default)]
    pub from_string: Option<String>,
    #[serde(rename = "toString", default)]
    pub to_string: Option<String>,
}

/// Changelog wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct Changelog {
    pub items: Vec<ChangelogItem>,
}

/// Acting tracker user.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRef {
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// Comment payload on comment events.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentBody {
    pub author: UserRef,
    pub body: String,
}

/// Envelope for all tracker webhook payloads we accept.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "webhookEvent")]
    pub webhook_event: String,
    pub issue: IssueRef,
    #[serde(default)]
    pub changelog: Option<Changelog>,
    #[serde(default)]
    pub comment: Option<CommentBody>,
    #[serde(default)]
    pub user: Option<UserRef>,
}

impl WebhookEnvelope {
    /// Parse a raw webhook body; structural failures are validation errors.
    pub fn parse(body: &[u8]) -> Result<Self, SyncError> {
        serde_json::from_slice(body).map_err(|e| SyncError::MalformedPayload(e.to_string()))
    }
}

/// Result of processing one inbound webhook.
#[derive(Debug)]
pub enum InboundOutcome {
    /// Changelog items applied as transitions
    Applied(Vec<Update>),
    /// The issue is not linked to any incident
    Unlinked,
    /// A comment event, to be routed to chat only
    Comment {
        issue_key: String,
        author: String,
        body: String,
        event: String,
    },
}

/// Translates inbound tracker webhooks into lifecycle transitions.
pub struct InboundProcessor {
    engine: Arc<LifecycleEngine>,
}

impl InboundProcessor {
    #[must_use]
    pub fn new(engine: Arc<LifecycleEngine>) -> Self {
        Self { engine }
    }

    /// Process one webhook envelope.
    pub async fn process(&self, envelope: WebhookEnvelope) -> Result<InboundOutcome, SyncError> {
        match envelope.webhook_event.as_str() {
            "issue_updated" => self.apply_issue_update(envelope).await,
            "comment_created" | "comment_updated" | "comment_deleted" => {
                let comment = envelope.comment.ok_or_else(|| {
                    SyncError::MalformedPayload("comment event without comment body".to_string())
                })?;
                Ok(InboundOutcome::Comment {
                    issue_key: envelope.issue.key,
                    author: comment.author.display_name,
                    body: comment.body,
                    event: envelope.webhook_event,
                })
            }
            other => Err(SyncError::UnsupportedEvent(other.to_string())),
        }
    }

    async fn apply_issue_update(
        &self,
        envelope: WebhookEnvelope,
    ) -> Result<InboundOutcome, SyncError> {
        let changelog = envelope.changelog.ok_or_else(|| {
            SyncError::MalformedPayload("issue_updated without changelog".to_string())
        })?;

        let Some(incident) = self
            .engine
            .store()
            .find_by_ticket_key(&envelope.issue.key)
            .await
        else {
            debug!(issue = %envelope.issue.key, "Webhook for unlinked issue, ignoring");
            return Ok(InboundOutcome::Unlinked);
        };

        let actor = envelope
            .user
            .map_or_else(|| "tracker".to_string(), |u| u.display_name);

        let mut ticket = self
            .engine
            .store()
            .ticket(incident.id)
            .await
            .ok()
            .flatten();
        let mut mirror_dirty = false;

        let mut applied = Vec::new();
        // Each changed field is evaluated independently; one bad item never
        // blocks the rest.
        for item in changelog.items {
            // The mirror follows the tracker's self-reported state even when
            // the engine rejects the move; the next outbound walk must start
            // from where the tracker actually is.
            if let (Some(ticket), Some(to)) = (ticket.as_mut(), item.to_string.as_deref()) {
                match item.field.as_str() {
                    "status" => {
                        ticket.external_status = to.to_string();
                        mirror_dirty = true;
                    }
                    "summary" => {
                        ticket.summary = to.to_string();
                        mirror_dirty = true;
                    }
                    "description" => {
                        ticket.description = to.to_string();
                        mirror_dirty = true;
                    }
                    "priority" => {
                        ticket.tracker_priority = to.to_string();
                        mirror_dirty = true;
                    }
                    _ => {}
                }
            }

            let Some(request) = translate_item(&item) else {
                debug!(field = %item.field, "Unrecognized tracker field, ignoring");
                continue;
            };
            let request = request
                .with_message(format!("Synchronized from tracker (changed by {actor})"))
                .from_tracker();

            match self.engine.transition(incident.id, request, None).await {
                Ok(update) => {
                    info!(
                        incident_id = %incident.id,
                        issue = %envelope.issue.key,
                        field = %item.field,
                        "Inbound tracker change applied"
                    );
                    applied.push(update);
                }
                Err(e) => {
                    // The tracker can move in ways our graph forbids; that
                    // is its business, not a reason to fail the webhook.
                    warn!(
                        incident_id = %incident.id,
                        field = %item.field,
                        error = %e,
                        "Inbound tracker change rejected by the engine"
                    );
                }
            }
        }

        if mirror_dirty {
            if let Some(ticket) = ticket {
                if self.engine.store().set_ticket(ticket).await.is_err() {
                    warn!(
                        incident_id = %incident.id,
                        "Incident vanished while refreshing the ticket mirror"
                    );
                }
            }
        }

        Ok(InboundOutcome::Applied(applied))
    }
}

/// Map one changelog item to a transition request, if we recognize it.
fn translate_item(item: &ChangelogItem) -> Option<TransitionRequest> {
    let to = item.to_string.as_deref()?;
    match item.field.as_str() {
        "status" => internal_target(to).map(TransitionRequest::status_change),
        "priority" => internal_priority(to).map(|p| TransitionRequest {
            priority: Some(p),
            ..TransitionRequest::default()
        }),
        "summary" => Some(TransitionRequest {
            title: Some(to.to_string()),
            ..TransitionRequest::default()
        }),
        "description" => Some(TransitionRequest {
            description: Some(to.to_string()),
            ..TransitionRequest::default()
        }),
        _ => None,
    }
}
