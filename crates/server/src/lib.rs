//! Incident service wiring.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod http;
pub mod queue;
pub mod signature;

pub use config::Config;
pub use http::{build_router, AppState};
pub use queue::{WebhookQueue, WebhookWorker};
pub use signature::verify_webhook_signature;
