//! Feature configuration for the lifecycle engine and its reactive
//! components.
//!
//! Passed explicitly into constructors so tests can vary flags per case;
//! nothing here is process-global.

/// Feature flags controlling report backends and tracker synchronization.
#[derive(Debug, Clone, Copy)]
pub struct Features {
    /// Wiki-based post-incident reports enabled
    pub wiki_reports: bool,
    /// Tracker-based post-incident reports enabled
    pub tracker_reports: bool,
    /// Outbound/inbound tracker synchronization enabled
    pub tracker_sync: bool,
}

impl Features {
    /// Load flags from environment variables, defaulting to all-on.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            wiki_reports: env_flag("WIKI_REPORTS_ENABLED", true),
            tracker_reports: env_flag("TRACKER_REPORTS_ENABLED", true),
            tracker_sync: env_flag("TRACKER_SYNC_ENABLED", true),
        }
    }

    /// All features off, for tests.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            wiki_reports: false,
            tracker_reports: false,
            tracker_sync: false,
        }
    }

    /// All features on.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            wiki_reports: true,
            tracker_reports: true,
            tracker_sync: true,
        }
    }

    /// Whether any report backend can host a post-incident report.
    ///
    /// With no backend enabled, no incident requires a report regardless of
    /// priority and environment.
    #[must_use]
    pub const fn any_report_backend(&self) -> bool {
        self.wiki_reports || self.tracker_reports
    }
}

impl Default for Features {
    fn default() -> Self {
        Self::all()
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_backend_means_no_report_requirement() {
        let features = Features {
            wiki_reports: false,
            tracker_reports: false,
            tracker_sync: true,
        };
        assert!(!features.any_report_backend());
        assert!(Features::all().any_report_backend());
    }
}
