//! Incident status machine.
//!
//! Statuses carry stable wire values (exposed to the REST API and the
//! tracker bridge) and progress monotonically; the only way back from
//! `Closed` is the explicit reopen operation on the engine.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an incident.
///
/// Wire values are stable and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Declared, nobody actively working yet
    Open,
    /// Under active investigation
    Investigating,
    /// Mitigation in progress
    Mitigating,
    /// Impact stopped, follow-up pending
    Mitigated,
    /// Post-incident report being written
    PostMortem,
    /// Terminal
    Closed,
}

impl Status {
    /// Stable numeric wire value.
    #[must_use]
    pub const fn wire_value(self) -> i32 {
        match self {
            Self::Open => 10,
            Self::Investigating => 20,
            Self::Mitigating => 30,
            Self::Mitigated => 40,
            Self::PostMortem => 50,
            Self::Closed => 60,
        }
    }

    /// Display name for chat and tracker surfaces.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Investigating => "Investigating",
            Self::Mitigating => "Mitigating",
            Self::Mitigated => "Mitigated",
            Self::PostMortem => "Post-mortem",
            Self::Closed => "Closed",
        }
    }

    /// Whether the incident has reached mitigation (or beyond).
    #[must_use]
    pub const fn is_mitigated(self) -> bool {
        self.wire_value() >= Self::Mitigated.wire_value()
    }

    /// Statuses a transition may target from `self`.
    ///
    /// `requires_report` widens the `Mitigated` exit to `PostMortem` and
    /// removes the direct close. `Closed` is terminal here; reopening is a
    /// separate operation, not an edge in this table.
    #[must_use]
    pub const fn allowed_next(self, requires_report: bool) -> &'static [Status] {
        match self {
            Self::Open => &[Self::Investigating, Self::Closed],
            Self::Investigating => &[Self::Mitigating, Self::Closed],
            Self::Mitigating => &[Self::Mitigated],
            Self::Mitigated => {
                if requires_report {
                    &[Self::PostMortem]
                } else {
                    &[Self::Closed]
                }
            }
            Self::PostMortem => &[Self::Closed],
            Self::Closed => &[],
        }
    }

    /// Whether `target` is a legal next status from `self`.
    #[must_use]
    pub fn can_transition_to(self, target: Status, requires_report: bool) -> bool {
        self != target && self.allowed_next(requires_report).contains(&target)
    }

    /// Closing from a pre-mitigation status must be justified.
    #[must_use]
    pub fn requires_closure_reason(current: Status, target: Status) -> bool {
        target == Self::Closed && matches!(current, Self::Open | Self::Investigating)
    }
}

impl TryFrom<i32> for Status {
    type Error = UnknownStatus;

    /// Unknown values fail closed; they are never clamped.
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(Self::Open),
            20 => Ok(Self::Investigating),
            30 => Ok(Self::Mitigating),
            40 => Ok(Self::Mitigated),
            50 => Ok(Self::PostMortem),
            60 => Ok(Self::Closed),
            other => Err(UnknownStatus(other)),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected out-of-range status wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown status value {0}")]
pub struct UnknownStatus(pub i32);
