//! Error types for report backends and the orchestrator.

use thiserror::Error;

/// Failures creating or probing post-incident reports.
#[derive(Debug, Error)]
pub enum ReportError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Wiki rejected a call
    #[error("wiki returned {status}: {body}")]
    Api { status: u16, body: String },

    /// Tracker-side failure while managing a report issue
    #[error(transparent)]
    Tracker(#[from] tracker_sync::SyncError),

    /// Store lookup failed
    #[error(transparent)]
    Store(#[from] incident::StoreError),
}
