//! Bidirectional synchronization bridge between the incident lifecycle
//! engine and the external issue tracker.
//!
//! Two independent legs share one suppression rule: a change is never
//! propagated back in the direction it came from. The outbound leg is a
//! lifecycle handler pushing changed syncable fields to the tracker; the
//! inbound leg translates tracker webhooks into engine transitions tagged
//! `tracker_status_sync`, which the outbound leg skips.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod client;
pub mod error;
pub mod inbound;
pub mod outbound;
pub mod workflow;

pub use client::{CreatedIssue, FieldUpdate, NewIssue, TrackerApi, TrackerClient, TransitionOption};
pub use error::SyncError;
pub use inbound::{InboundOutcome, InboundProcessor, WebhookEnvelope};
pub use outbound::SyncBridge;
pub use workflow::{
    external_target, internal_priority, internal_target, tracker_priority, WorkflowEdge,
    WorkflowGraph,
};
