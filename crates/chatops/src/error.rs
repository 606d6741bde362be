//! Error types for chat notifications.

use thiserror::Error;

/// Errors that can occur when posting to the chat workspace.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Channel is not configured
    #[error("channel not configured: {0}")]
    NotConfigured(String),

    /// Chat workspace rejected the post
    #[error("chat workspace returned {status}: {body}")]
    Api { status: u16, body: String },
}
