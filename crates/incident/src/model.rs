//! Domain model: incidents, the append-only update ledger, milestones, and
//! the satellite records mirroring external systems.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::status::Status;

/// Incident identifier.
pub type IncidentId = Uuid;

/// Priority class, P1 (highest) to P5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    P1,
    P2,
    P3,
    P4,
    P5,
}

impl Priority {
    /// Ordinal wire value, 1 = highest.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        match self {
            Self::P1 => 1,
            Self::P2 => 2,
            Self::P3 => 3,
            Self::P4 => 4,
            Self::P5 => 5,
        }
    }

    /// Whether this priority class mandates a post-incident report.
    #[must_use]
    pub const fn requires_report(self) -> bool {
        matches!(self, Self::P1 | Self::P2)
    }

    /// Response SLA for the class.
    #[must_use]
    pub const fn sla_hours(self) -> u32 {
        match self {
            Self::P1 => 1,
            Self::P2 => 4,
            Self::P3 => 24,
            Self::P4 => 72,
            Self::P5 => 168,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
            Self::P4 => "P4",
            Self::P5 => "P5",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment environment the incident affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Production,
    Staging,
    Development,
}

impl Environment {
    /// Only production incidents can mandate a report.
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Development => "development",
        }
    }
}

/// Justification for closing an incident before mitigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosureReason {
    /// Normal progression; never offered for early closure
    Resolved,
    Duplicate,
    FalsePositive,
    Superseded,
    External,
    Cancelled,
}

impl ClosureReason {
    /// Reasons offered when closing from `Open` or `Investigating`.
    ///
    /// `Resolved` implies normal progression and is therefore excluded.
    #[must_use]
    pub const fn early_closure_choices() -> &'static [Self] {
        &[
            Self::Duplicate,
            Self::FalsePositive,
            Self::Superseded,
            Self::External,
            Self::Cancelled,
        ]
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::Duplicate => "duplicate",
            Self::FalsePositive => "false_positive",
            Self::Superseded => "superseded",
            Self::External => "external",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Tag classifying a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Status moved forward
    StatusChange,
    /// A milestone timestamp was recorded
    KeyEvent,
    /// Non-status field edit (priority, commander, ...)
    FieldChange,
    /// Change applied on behalf of the external tracker
    TrackerStatusSync,
    /// Incident closed
    Closure,
    /// Incident reopened from `Closed`
    Reopen,
}

impl EventType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StatusChange => "status_change",
            Self::KeyEvent => "key_event",
            Self::FieldChange => "field_change",
            Self::TrackerStatusSync => "tracker_status_sync",
            Self::Closure => "closure",
            Self::Reopen => "reopen",
        }
    }
}

/// A named point in an incident's timeline, possibly required before close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    Detected,
    Mitigated,
    RootCauseIdentified,
}

impl Milestone {
    /// Milestones that must have a ledger entry before an incident closes
    /// through the normal path.
    #[must_use]
    pub const fn required() -> &'static [Self] {
        &[Self::Detected, Self::Mitigated]
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Mitigated => "mitigated",
            Self::RootCauseIdentified => "root_cause_identified",
        }
    }
}

impl std::fmt::Display for Milestone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The tracked operational event under management.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    /// Identifier
    pub id: IncidentId,
    /// Short summary
    pub title: String,
    /// Free-form description
    pub description: String,
    /// Current lifecycle status
    pub status: Status,
    /// Priority class
    pub priority: Priority,
    /// Affected environment
    pub environment: Environment,
    /// Category label (e.g. "availability", "security")
    pub category: String,
    /// Who declared the incident
    pub creator: String,
    /// Incident commander, if assigned
    pub commander: Option<String>,
    /// Communication lead, if assigned
    pub communication_lead: Option<String>,
    /// Declaration timestamp
    pub created_at: DateTime<Utc>,
    /// Set when the incident reaches `Closed`
    pub closed_at: Option<DateTime<Utc>>,
    /// Set iff the incident was closed from `Open` or `Investigating`
    pub closure_reason: Option<ClosureReason>,
    /// Secondary environment selections and other free-form fields
    #[serde(default)]
    pub custom_fields: HashMap<String, String>,
}

impl Incident {
    /// Start a new incident in `Open`.
    #[must_use]
    pub fn declare(
        title: impl Into<String>,
        description: impl Into<String>,
        priority: Priority,
        environment: Environment,
        category: impl Into<String>,
        creator: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            status: Status::Open,
            priority,
            environment,
            category: category.into(),
            creator: creator.into(),
            commander: None,
            communication_lead: None,
            created_at: Utc::now(),
            closed_at: None,
            closure_reason: None,
            custom_fields: HashMap::new(),
        }
    }
}

/// Immutable ledger entry recording one state change.
///
/// Never mutated or deleted, only appended; system-originated entries carry
/// no actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    /// Entry identifier
    pub id: Uuid,
    /// Incident this entry belongs to
    pub incident_id: IncidentId,
    /// New status, when the entry records a status change
    pub new_status: Option<Status>,
    /// New priority, when changed
    pub new_priority: Option<Priority>,
    /// New category, when changed
    pub new_category: Option<String>,
    /// New commander, when changed
    pub new_commander: Option<String>,
    /// Milestone recorded by this entry, for `key_event` entries
    pub milestone: Option<Milestone>,
    /// Free-text message
    pub message: String,
    /// Entry classification
    pub event_type: EventType,
    /// Acting user; `None` for system-originated entries
    pub actor: Option<String>,
    /// Append timestamp
    pub created_at: DateTime<Utc>,
}

/// Backend that can host a post-incident report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportBackendKind {
    /// Wiki page built from a template
    Wiki,
    /// Dedicated issue in the external tracker
    Tracker,
}

impl ReportBackendKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wiki => "wiki",
            Self::Tracker => "tracker",
        }
    }
}

impl std::fmt::Display for ReportBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link to a post-incident report in an external backend.
///
/// Unique per (incident, backend); the store enforces this on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportLink {
    /// Incident the report belongs to
    pub incident_id: IncidentId,
    /// Hosting backend
    pub backend: ReportBackendKind,
    /// Backend-side identifier (page id or issue key)
    pub external_id: String,
    /// Backend-side URL, when known
    pub url: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Who triggered creation; `None` for the orchestrator
    pub created_by: Option<String>,
}

/// Mirror of the external tracker issue linked to an incident.
///
/// Created on first outward sync or on inbound ticket creation, updated by
/// both sync directions, never deleted while the incident exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerTicket {
    /// Incident the ticket mirrors
    pub incident_id: IncidentId,
    /// Tracker-side numeric/string id
    pub external_id: String,
    /// Tracker-side key (e.g. "OPS-1234")
    pub external_key: String,
    /// Last synchronized summary
    pub summary: String,
    /// Last synchronized description
    pub description: String,
    /// Priority on the tracker's own scale
    pub tracker_priority: String,
    /// Impact label mirrored to the tracker
    pub impact: String,
    /// Last known tracker-side workflow state
    pub external_status: String,
    /// Reporter identity on the tracker side
    pub reporter: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_top_priorities_require_reports() {
        assert!(Priority::P1.requires_report());
        assert!(Priority::P2.requires_report());
        assert!(!Priority::P3.requires_report());
        assert!(!Priority::P4.requires_report());
        assert!(!Priority::P5.requires_report());
    }

    #[test]
    fn resolved_excluded_from_early_closure_choices() {
        assert!(!ClosureReason::early_closure_choices().contains(&ClosureReason::Resolved));
        assert_eq!(ClosureReason::early_closure_choices().len(), 5);
    }

    #[test]
    fn declared_incident_starts_open() {
        let incident = Incident::declare(
            "API outage",
            "5xx spike on the public API",
            Priority::P1,
            Environment::Production,
            "availability",
            "alice",
        );
        assert_eq!(incident.status, Status::Open);
        assert!(incident.closed_at.is_none());
        assert!(incident.closure_reason.is_none());
    }

    #[test]
    fn event_type_tags_are_stable() {
        assert_eq!(EventType::TrackerStatusSync.as_str(), "tracker_status_sync");
        assert_eq!(EventType::KeyEvent.as_str(), "key_event");
        assert_eq!(EventType::StatusChange.as_str(), "status_change");
    }

    #[test]
    fn serde_tags_match_wire_strings() {
        let json = serde_json::to_value(EventType::TrackerStatusSync).unwrap();
        assert_eq!(json, serde_json::json!("tracker_status_sync"));
        let json = serde_json::to_value(ClosureReason::FalsePositive).unwrap();
        assert_eq!(json, serde_json::json!("false_positive"));
    }
}
