//! Post-incident report orchestration.
//!
//! This crate provides:
//! - [`ReportBackend`], the seam between the orchestrator and the systems
//!   hosting report artifacts
//! - [`WikiBackend`] and [`TrackerReportBackend`], the two real backends
//! - [`ReportOrchestrator`], the lifecycle handler guaranteeing at most
//!   one report link per (incident, backend)
//! - [`BackendReadiness`], the engine-facing readiness probe

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod backend;
pub mod error;
pub mod orchestrator;
pub mod readiness;
pub mod tracker;
pub mod wiki;

pub use backend::{CreatedReport, ReportBackend};
pub use error::ReportError;
pub use orchestrator::ReportOrchestrator;
pub use readiness::BackendReadiness;
pub use tracker::TrackerReportBackend;
pub use wiki::WikiBackend;
