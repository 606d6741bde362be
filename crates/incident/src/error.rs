//! Error taxonomy for the lifecycle engine.
//!
//! Validation and conflict failures are distinct so callers can tell "fix
//! your input" apart from "retry with fresh state".

use thiserror::Error;

use crate::model::{IncidentId, Milestone, ReportBackendKind};
use crate::status::Status;

/// Errors returned by `transition()` and `reopen()`.
#[derive(Debug, Error)]
pub enum TransitionError {
    /// The request is invalid against the current incident state
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A concurrent transition won the race; retry with fresh state
    #[error("conflict: {0}")]
    Conflict(String),

    /// No such incident
    #[error("incident {0} not found")]
    NotFound(IncidentId),
}

/// Reasons a proposed transition is invalid.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The transition graph forbids the move
    #[error("illegal transition {current} -> {target}")]
    IllegalTransition { current: Status, target: Status },

    /// Closing from an early status without a justification
    #[error("closing from {current} requires a closure reason")]
    MissingClosureReason { current: Status },

    /// Closure reason supplied where none is allowed
    #[error("closure reason only applies when closing from an early status")]
    UnexpectedClosureReason,

    /// Reopen preconditions not met
    #[error("reopen rejected: {0}")]
    Reopen(String),

    /// The request changes nothing
    #[error("request contains no changes")]
    EmptyRequest,

    /// A milestone of the key-event kind was already recorded
    #[error("milestone {0} already recorded")]
    DuplicateMilestone(Milestone),
}

/// Why an incident cannot be closed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseBlocker {
    /// Status before `Mitigated` and no closure reason supplied
    NotMitigated,
    /// A required milestone lacks a ledger entry
    MissingMilestone(Milestone),
    /// The mandated report has not been created for this backend
    ReportMissing(ReportBackendKind),
    /// The report exists but its backend has not marked it ready
    ReportNotReady(ReportBackendKind),
    /// The backend readiness check failed; state unknown
    ReportStatusUnknown(ReportBackendKind),
}

impl std::fmt::Display for CloseBlocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotMitigated => write!(f, "incident not yet mitigated"),
            Self::MissingMilestone(m) => write!(f, "missing required milestone: {m}"),
            Self::ReportMissing(b) => write!(f, "report missing in {b} backend"),
            Self::ReportNotReady(b) => write!(f, "report in {b} backend not marked ready"),
            Self::ReportStatusUnknown(b) => {
                write!(f, "report status unknown for {b} backend")
            }
        }
    }
}

/// Storage-level failures surfaced by the incident store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No such incident
    #[error("incident {0} not found")]
    NotFound(IncidentId),
}
