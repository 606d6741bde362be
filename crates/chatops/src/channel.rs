//! Chat workspace channel.
//!
//! Messages go to the incident's own channel or to the global ops channel,
//! as color-coded attachments over an incoming webhook.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use incident::{IncidentId, Priority};

use crate::error::ChannelError;

/// Severity levels for chat messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Attachment color for this severity.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Info => "#3498db",     // Blue
            Self::Warning => "#f39c12",  // Orange
            Self::Critical => "#e74c3c", // Red
        }
    }

    /// Severity implied by an incident's priority.
    #[must_use]
    pub const fn for_priority(priority: Priority) -> Self {
        match priority {
            Priority::P1 => Self::Critical,
            Priority::P2 => Self::Warning,
            Priority::P3 | Priority::P4 | Priority::P5 => Self::Info,
        }
    }
}

/// Where a message should land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelTarget {
    /// The incident's own channel
    Incident(IncidentId),
    /// The global ops channel
    Global,
}

/// One message to post.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub target: ChannelTarget,
    pub title: String,
    pub body: String,
    pub severity: Severity,
}

/// Seam the dispatcher, reminder scanner, and report orchestrator post
/// through; tests substitute a recorder.
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Post one message to the workspace.
    async fn post(&self, message: &ChatMessage) -> Result<(), ChannelError>;
}

/// Incoming-webhook chat channel.
pub struct WebhookChannel {
    webhook_url: Option<String>,
    global_webhook_url: Option<String>,
    client: reqwest::Client,
}

impl WebhookChannel {
    /// Create a channel from environment variables.
    ///
    /// Reads `CHAT_WEBHOOK_URL` and `CHAT_GLOBAL_WEBHOOK_URL`; either may be
    /// absent, disabling the corresponding target.
    #[must_use]
    pub fn from_env() -> Self {
        let webhook_url = std::env::var("CHAT_WEBHOOK_URL").ok();
        let global_webhook_url = std::env::var("CHAT_GLOBAL_WEBHOOK_URL").ok();

        if webhook_url.is_none() {
            debug!("Incident chat notifications disabled (CHAT_WEBHOOK_URL not set)");
        }

        Self {
            webhook_url,
            global_webhook_url,
            client: reqwest::Client::new(),
        }
    }

    /// Create a channel with explicit webhook URLs.
    #[must_use]
    pub fn new(webhook_url: String, global_webhook_url: Option<String>) -> Self {
        Self {
            webhook_url: Some(webhook_url),
            global_webhook_url,
            client: reqwest::Client::new(),
        }
    }

    fn url_for(&self, target: ChannelTarget) -> Result<&str, ChannelError> {
        match target {
            ChannelTarget::Incident(_) => self
                .webhook_url
                .as_deref()
                .ok_or_else(|| ChannelError::NotConfigured("CHAT_WEBHOOK_URL".to_string())),
            ChannelTarget::Global => self
                .global_webhook_url
                .as_deref()
                .ok_or_else(|| ChannelError::NotConfigured("CHAT_GLOBAL_WEBHOOK_URL".to_string())),
        }
    }
}

#[async_trait]
impl ChatSink for WebhookChannel {
    async fn post(&self, message: &ChatMessage) -> Result<(), ChannelError> {
        let url = self.url_for(message.target)?;

        let channel_hint = match message.target {
            ChannelTarget::Incident(id) => format!("inc-{}", &id.to_string()[..8]),
            ChannelTarget::Global => "ops-incidents".to_string(),
        };

        let payload = WebhookPayload {
            channel: channel_hint,
            attachments: vec![Attachment {
                fallback: message.title.clone(),
                color: message.severity.color().to_string(),
                title: message.title.clone(),
                text: message.body.clone(),
            }],
        };

        debug!(title = %message.title, "Posting chat message");

        let response = self.client.post(url).json(&payload).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, body = %body, "Chat webhook request failed");
            Err(ChannelError::Api { status, body })
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    channel: String,
    attachments: Vec<Attachment>,
}

#[derive(Debug, Serialize)]
struct Attachment {
    fallback: String,
    color: String,
    title: String,
    text: String,
}

/// Format seconds into a human-readable duration.
#[must_use]
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn severity_tracks_priority() {
        assert_eq!(Severity::for_priority(Priority::P1), Severity::Critical);
        assert_eq!(Severity::for_priority(Priority::P2), Severity::Warning);
        assert_eq!(Severity::for_priority(Priority::P4), Severity::Info);
    }

    #[test]
    fn durations_format_compactly() {
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(180), "3m");
        assert_eq!(format_duration(7260), "2h 1m");
        assert_eq!(format_duration(440_000), "5d 2h");
    }

    #[tokio::test]
    async fn post_sends_attachment_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "attachments": [{ "title": "Incident mitigated", "color": "#f39c12" }]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WebhookChannel::new(format!("{}/hook", server.uri()), None);
        channel
            .post(&ChatMessage {
                target: ChannelTarget::Incident(uuid::Uuid::new_v4()),
                title: "Incident mitigated".to_string(),
                body: "impact stopped".to_string(),
                severity: Severity::Warning,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_global_webhook_is_not_configured() {
        let channel = WebhookChannel::new("https://chat.example/hook".to_string(), None);
        let err = channel
            .post(&ChatMessage {
                target: ChannelTarget::Global,
                title: "t".to_string(),
                body: "b".to_string(),
                severity: Severity::Info,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured(_)));
    }
}
