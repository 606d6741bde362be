//! REST client for the external issue tracker.
//!
//! The bridge talks to the tracker through the [`TrackerApi`] trait so
//! tests can substitute a recording fake; [`TrackerClient`] is the real
//! Jira-dialect implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::SyncError;

/// Fields sent when creating a tracker issue.
#[derive(Debug, Clone, Serialize)]
pub struct NewIssue {
    /// Project key, e.g. "OPS"
    pub project: String,
    /// Issue type name, e.g. "Incident" or "Post-mortem"
    pub issue_type: String,
    /// Summary line
    pub summary: String,
    /// Body text
    pub description: String,
    /// Priority on the tracker scale
    pub priority: String,
    /// Impact label custom field
    pub impact: Option<String>,
    /// Category custom field
    pub category: Option<String>,
}

/// Issue handle returned by the tracker on creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedIssue {
    /// Tracker-side id
    pub id: String,
    /// Tracker-side key
    pub key: String,
    /// Browse URL, when the tracker returns one
    #[serde(default)]
    pub url: Option<String>,
}

/// Partial field update for an existing issue.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FieldUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Priority name on the tracker scale
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// Assignee/commander account name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

impl FieldUpdate {
    /// Whether the update carries any field at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.assignee.is_none()
    }
}

/// One transition currently offered on a tracker issue.
#[derive(Debug, Clone, Deserialize)]
pub struct TransitionOption {
    /// Transition id to execute
    pub id: String,
    /// Transition name as shown in the workflow
    pub name: String,
}

/// Operations the sync bridge needs from the tracker.
#[async_trait]
pub trait TrackerApi: Send + Sync {
    /// Create an issue.
    async fn create_issue(&self, issue: &NewIssue) -> Result<CreatedIssue, SyncError>;

    /// Apply a partial field update to an issue.
    async fn update_fields(&self, key: &str, fields: &FieldUpdate) -> Result<(), SyncError>;

    /// Transitions currently available on an issue.
    async fn available_transitions(&self, key: &str) -> Result<Vec<TransitionOption>, SyncError>;

    /// Execute one transition by id.
    async fn perform_transition(&self, key: &str, transition_id: &str) -> Result<(), SyncError>;

    /// Current workflow status name of an issue.
    async fn issue_status(&self, key: &str) -> Result<String, SyncError>;

    /// Add a watcher to an issue.
    async fn add_watcher(&self, key: &str, account: &str) -> Result<(), SyncError>;

    /// Link two issues.
    async fn link_issues(
        &self,
        link_type: &str,
        inward_key: &str,
        outward_key: &str,
    ) -> Result<(), SyncError>;
}

/// Reqwest-backed tracker client.
pub struct TrackerClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl TrackerClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/api/2/{path}", self.base_url.trim_end_matches('/'))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Tracker call rejected");
            Err(SyncError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response, SyncError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        Self::check(response).await
    }
}

#[async_trait]
impl TrackerApi for TrackerClient {
    async fn create_issue(&self, issue: &NewIssue) -> Result<CreatedIssue, SyncError> {
        let mut fields = json!({
            "project": { "key": issue.project },
            "issuetype": { "name": issue.issue_type },
            "summary": issue.summary,
            "description": issue.description,
            "priority": { "name": issue.priority },
        });
        if let Some(impact) = &issue.impact {
            fields["customfield_impact"] = json!(impact);
        }
        if let Some(category) = &issue.category {
            fields["customfield_category"] = json!(category);
        }

        debug!(project = %issue.project, issue_type = %issue.issue_type, "Creating tracker issue");
        let response = self.post("issue", &json!({ "fields": fields })).await?;
        Ok(response.json().await?)
    }

    async fn update_fields(&self, key: &str, fields: &FieldUpdate) -> Result<(), SyncError> {
        let mut body = serde_json::Map::new();
        if let Some(summary) = &fields.summary {
            body.insert("summary".to_string(), json!(summary));
        }
        if let Some(description) = &fields.description {
            body.insert("description".to_string(), json!(description));
        }
        if let Some(priority) = &fields.priority {
            body.insert("priority".to_string(), json!({ "name": priority }));
        }
        if let Some(assignee) = &fields.assignee {
            body.insert("assignee".to_string(), json!({ "name": assignee }));
        }

        debug!(issue = %key, field_count = body.len(), "Updating tracker fields");
        let response = self
            .client
            .put(self.url(&format!("issue/{key}")))
            .bearer_auth(&self.token)
            .json(&json!({ "fields": Value::Object(body) }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn available_transitions(&self, key: &str) -> Result<Vec<TransitionOption>, SyncError> {
        #[derive(Deserialize)]
        struct TransitionsResponse {
            transitions: Vec<TransitionOption>,
        }

        let response = self
            .client
            .get(self.url(&format!("issue/{key}/transitions")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let parsed: TransitionsResponse = Self::check(response).await?.json().await?;
        Ok(parsed.transitions)
    }

    async fn perform_transition(&self, key: &str, transition_id: &str) -> Result<(), SyncError> {
        debug!(issue = %key, transition_id, "Performing tracker transition");
        self.post(
            &format!("issue/{key}/transitions"),
            &json!({ "transition": { "id": transition_id } }),
        )
        .await?;
        Ok(())
    }

    async fn issue_status(&self, key: &str) -> Result<String, SyncError> {
        #[derive(Deserialize)]
        struct StatusName {
            name: String,
        }
        #[derive(Deserialize)]
        struct StatusField {
            status: StatusName,
        }
        #[derive(Deserialize)]
        struct IssueResponse {
            fields: StatusField,
        }

        let response = self
            .client
            .get(self.url(&format!("issue/{key}?fields=status")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let parsed: IssueResponse = Self::check(response).await?.json().await?;
        Ok(parsed.fields.status.name)
    }

    async fn add_watcher(&self, key: &str, account: &str) -> Result<(), SyncError> {
        self.post(&format!("issue/{key}/watchers"), &json!(account))
            .await?;
        Ok(())
    }

    async fn link_issues(
        &self,
        link_type: &str,
        inward_key: &str,
        outward_key: &str,
    ) -> Result<(), SyncError> {
        self.post(
            "issueLink",
            &json!({
                "type": { "name": link_type },
                "inwardIssue": { "key": inward_key },
                "outwardIssue": { "key": outward_key },
            }),
        )
        .await?;
        Ok(())
    }
}
