//! Wiki report backend.
//!
//! Creates a Confluence-dialect page seeded with the incident facts and a
//! timeline rendered from the ledger. A page counts as ready once someone
//! has edited it past the generated skeleton, which the version number
//! tells us without any content diffing.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use chatops::format_duration;
use incident::{EventType, Incident, ReportBackendKind, ReportLink, Status, Update};

use crate::backend::{CreatedReport, ReportBackend};
use crate::error::ReportError;

/// Confluence-dialect wiki client hosting post-incident report pages.
pub struct WikiBackend {
    base_url: String,
    token: String,
    space_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct PageLinks {
    #[serde(default)]
    base: Option<String>,
    #[serde(default)]
    webui: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedPage {
    id: String,
    #[serde(rename = "_links", default)]
    links: Option<PageLinks>,
}

#[derive(Debug, Deserialize)]
struct PageVersion {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct PageWithVersion {
    version: PageVersion,
}

impl WikiBackend {
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        space_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            space_key: space_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/api/content{path}", self.base_url.trim_end_matches('/'))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ReportError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Wiki call rejected");
            Err(ReportError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl ReportBackend for WikiBackend {
    fn kind(&self) -> ReportBackendKind {
        ReportBackendKind::Wiki
    }

    async fn create(
        &self,
        incident: &Incident,
        timeline: &[Update],
    ) -> Result<CreatedReport, ReportError> {
        let title = format!(
            "Post-incident report: {} ({})",
            incident.title,
            Utc::now().format("%Y-%m-%d")
        );
        debug!(incident_id = %incident.id, space = %self.space_key, "Creating wiki report page");

        let response = self
            .client
            .post(self.url(""))
            .bearer_auth(&self.token)
            .json(&json!({
                "type": "page",
                "title": title,
                "space": { "key": self.space_key },
                "body": {
                    "storage": {
                        "value": render_skeleton(incident, timeline),
                        "representation": "storage"
                    }
                }
            }))
            .send()
            .await?;
        let page: CreatedPage = Self::check(response).await?.json().await?;

        let url = page.links.and_then(|l| match (l.base, l.webui) {
            (Some(base), Some(webui)) => Some(format!("{base}{webui}")),
            _ => None,
        });
        Ok(CreatedReport {
            external_id: page.id,
            url,
        })
    }

    async fn is_ready(&self, link: &ReportLink) -> Result<bool, ReportError> {
        let response = self
            .client
            .get(self.url(&format!("/{}?expand=version", link.external_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let page: PageWithVersion = Self::check(response).await?.json().await?;
        // Version 1 is the skeleton we generated; any later version means a
        // human has written the report.
        Ok(page.version.number > 1)
    }
}

/// Render the page skeleton in storage format.
fn render_skeleton(incident: &Incident, timeline: &[Update]) -> String {
    let mut page = String::new();
    page.push_str("<h2>Summary</h2>");
    page.push_str(&format!("<p>{}</p>", escape(&incident.description)));

    page.push_str("<h2>Facts</h2><ul>");
    page.push_str(&format!("<li>Priority: {}</li>", incident.priority));
    page.push_str(&format!(
        "<li>Environment: {}</li>",
        incident.environment.as_str()
    ));
    page.push_str(&format!("<li>Category: {}</li>", escape(&incident.category)));
    if let Some(commander) = &incident.commander {
        page.push_str(&format!("<li>Commander: {}</li>", escape(commander)));
    }
    if let Some(mitigated_at) = timeline
        .iter()
        .find(|u| u.new_status == Some(Status::Mitigated))
        .map(|u| u.created_at)
    {
        let elapsed = mitigated_at - incident.created_at;
        page.push_str(&format!(
            "<li>Time to mitigation: {}</li>",
            format_duration(u64::try_from(elapsed.num_seconds()).unwrap_or(0))
        ));
    }
    page.push_str("</ul>");

    page.push_str("<h2>Timeline</h2><ul>");
    for entry in timeline {
        let label = match entry.event_type {
            EventType::KeyEvent => entry
                .milestone
                .map_or_else(|| "key event".to_string(), |m| m.to_string()),
            _ => entry
                .new_status
                .map_or_else(|| entry.event_type.as_str().to_string(), |s| s.to_string()),
        };
        page.push_str(&format!(
            "<li>{} - {}{}</li>",
            entry.created_at.format("%Y-%m-%d %H:%M UTC"),
            escape(&label),
            if entry.message.is_empty() {
                String::new()
            } else {
                format!(": {}", escape(&entry.message))
            }
        ));
    }
    page.push_str("</ul>");

    page.push_str("<h2>Root cause</h2><p><em>To be written.</em></p>");
    page.push_str("<h2>Action items</h2><p><em>To be written.</em></p>");
    page
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
