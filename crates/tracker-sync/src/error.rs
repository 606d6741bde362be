//! Error types for the tracker bridge.

use thiserror::Error;

/// Failures talking to or reasoning about the external tracker.
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Tracker rejected a call
    #[error("tracker returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The external workflow graph has no route between two states
    #[error("no transition path from '{from}' to '{to}' in the tracker workflow")]
    NoPath { from: String, to: String },

    /// A planned transition is not offered by the tracker right now
    #[error("transition '{0}' not available on the tracker issue")]
    TransitionUnavailable(String),

    /// Webhook payload missing required structure
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),

    /// Webhook event kind we do not accept
    #[error("unsupported webhook event '{0}'")]
    UnsupportedEvent(String),
}
