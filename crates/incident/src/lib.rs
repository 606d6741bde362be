//! Incident lifecycle engine.
//!
//! This crate provides:
//! - The incident domain model and append-only update ledger
//! - The status transition table with priority-dependent exceptions
//! - The lifecycle engine, the single mutation entry point
//! - Typed lifecycle events with an ordered handler dispatcher
//! - An in-process store with per-incident row locks and
//!   uniqueness-constrained report links
//!
//! The engine performs no network I/O; external collaborators (tracker,
//! chat, wiki) hang off the event dispatcher in their own crates.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod model;
pub mod status;
pub mod store;

pub use config::Features;
pub use engine::{LifecycleEngine, TransitionRequest};
pub use error::{CloseBlocker, StoreError, TransitionError, ValidationError};
pub use events::{ChangedField, Dispatcher, LifecycleEvent, LifecycleHandler};
pub use ledger::{enabled_backends, requires_report, Ledger, ReadinessProbeError, ReportReadiness};
pub use model::{
    ClosureReason, Environment, EventType, Incident, IncidentId, Milestone, Priority,
    ReportBackendKind, ReportLink, TrackerTicket, Update,
};
pub use status::{Status, UnknownStatus};
pub use store::{IncidentStore, LinkExists};
