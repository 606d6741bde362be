//! Configuration for the incident service.

use std::env;

use incident::Features;

/// Server configuration, read from the environment once at startup.
#[derive(Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,
    /// Webhook signing secret for signature verification.
    pub webhook_secret: Option<String>,
    /// Feature flags for report backends and tracker sync.
    pub features: Features,
    /// Tracker base URL (e.g. "https://tracker.example.com").
    pub tracker_base_url: Option<String>,
    /// Tracker API token.
    pub tracker_token: Option<String>,
    /// Tracker project key for report issues.
    pub tracker_project: String,
    /// Wiki base URL.
    pub wiki_base_url: Option<String>,
    /// Wiki API token.
    pub wiki_token: Option<String>,
    /// Wiki space hosting report pages.
    pub wiki_space: String,
    /// Webhook queue capacity.
    pub queue_capacity: usize,
    /// Reminder scan interval in seconds.
    pub reminder_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            webhook_secret: env::var("TRACKER_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            features: Features::from_env(),
            tracker_base_url: env::var("TRACKER_BASE_URL").ok(),
            tracker_token: env::var("TRACKER_TOKEN").ok(),
            tracker_project: env::var("TRACKER_PROJECT").unwrap_or_else(|_| "OPS".to_string()),
            wiki_base_url: env::var("WIKI_BASE_URL").ok(),
            wiki_token: env::var("WIKI_TOKEN").ok(),
            wiki_space: env::var("WIKI_SPACE").unwrap_or_else(|_| "INC".to_string()),
            queue_capacity: env::var("WEBHOOK_QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(256),
            reminder_interval_secs: env::var("REMINDER_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
        }
    }
}
