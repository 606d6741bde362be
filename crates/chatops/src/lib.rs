//! Chat-ops surface for the incident platform.
//!
//! This crate provides:
//! - [`WebhookChannel`], the incoming-webhook chat client
//! - [`NotificationDispatcher`], the lifecycle handler posting status
//!   updates, global mirrors, and key-event prompts
//! - [`ReminderScanner`], the idempotent periodic reminder scan

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod reminders;

pub use channel::{format_duration, ChannelTarget, ChatMessage, ChatSink, Severity, WebhookChannel};
pub use dispatcher::NotificationDispatcher;
pub use error::ChannelError;
pub use reminders::{ReminderConfig, ReminderKind, ReminderScanner};
