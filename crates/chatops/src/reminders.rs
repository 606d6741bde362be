//! Idempotent reminder scanning.
//!
//! A periodic scan walks open incidents and sends at most one reminder per
//! (incident, kind), gated on the store's sent-marker records. The scan
//! tolerates being delayed or skipped; it checks time windows instead of
//! assuming exact cadence.

use std::sync::Arc;

use chrono::{DateTime, Duration, Timelike, Utc};
use tracing::{debug, info, warn};

use incident::{enabled_backends, requires_report, Features, IncidentStore, Status};

use crate::channel::{ChannelTarget, ChatMessage, ChatSink, Severity};

/// Kinds of one-shot reminders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    /// No ledger activity for the configured window
    NoRecentUpdate,
    /// Report still missing days after mitigation
    ReportPending,
}

impl ReminderKind {
    /// Store marker key; one send per (incident, marker).
    #[must_use]
    pub const fn marker(self) -> &'static str {
        match self {
            Self::NoRecentUpdate => "no_recent_update",
            Self::ReportPending => "report_pending",
        }
    }
}

/// Reminder timing configuration.
#[derive(Debug, Clone, Copy)]
pub struct ReminderConfig {
    /// "No update in N hours" window
    pub stale_after: Duration,
    /// "Report still pending" window after mitigation
    pub report_pending_after: Duration,
    /// Reminders only go out between these UTC hours
    pub business_hours: (u32, u32),
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::hours(4),
            report_pending_after: Duration::days(5),
            business_hours: (9, 17),
        }
    }
}

impl ReminderConfig {
    /// Whether `now` falls inside the send window.
    #[must_use]
    pub fn within_business_hours(&self, now: DateTime<Utc>) -> bool {
        let hour = now.hour();
        let (start, end) = self.business_hours;
        hour >= start && hour < end
    }
}

/// Periodic reminder scanner.
pub struct ReminderScanner {
    store: IncidentStore,
    chat: Arc<dyn ChatSink>,
    features: Features,
    config: ReminderConfig,
}

impl ReminderScanner {
    #[must_use]
    pub fn new(
        store: IncidentStore,
        chat: Arc<dyn ChatSink>,
        features: Features,
        config: ReminderConfig,
    ) -> Self {
        Self {
            store,
            chat,
            features,
            config,
        }
    }

    /// One scan pass; returns the number of reminders sent.
    pub async fn scan_once(&self, now: DateTime<Utc>) -> usize {
        if !self.config.within_business_hours(now) {
            debug!("Outside business hours, reminder scan skipped");
            return 0;
        }

        let mut sent = 0;
        for incident in self.store.list().await {
            if incident.status == Status::Closed {
                continue;
            }

            // Each kind is due or not on its own; a stale incident with an
            // overdue report gets both reminders.
            for kind in self.due_reminders(&incident, now).await {
                // The marker insert is the idempotence check: only the
                // first recorder of a marker gets to send.
                match self.store.record_sent_marker(incident.id, kind.marker()).await {
                    Ok(true) => {
                        if let Err(e) = self.send(&incident, kind, now).await {
                            warn!(
                                incident_id = %incident.id,
                                error = %e,
                                "Failed to send reminder"
                            );
                        } else {
                            sent += 1;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => warn!(incident_id = %incident.id, error = %e, "Marker check failed"),
                }
            }
        }

        if sent > 0 {
            info!(sent, "Reminder scan complete");
        }
        sent
    }

    async fn due_reminders(
        &self,
        incident: &incident::Incident,
        now: DateTime<Utc>,
    ) -> Vec<ReminderKind> {
        let Ok(updates) = self.store.updates(incident.id).await else {
            return Vec::new();
        };
        let mut due = Vec::new();

        let last_activity = updates
            .last()
            .map_or(incident.created_at, |u| u.created_at);
        if now - last_activity > self.config.stale_after {
            due.push(ReminderKind::NoRecentUpdate);
        }

        if requires_report(incident, &self.features) && incident.status.is_mitigated() {
            let mitigated_at = updates
                .iter()
                .find(|u| u.new_status == Some(Status::Mitigated))
                .map(|u| u.created_at);
            if let Some(mitigated_at) = mitigated_at {
                if now - mitigated_at > self.config.report_pending_after {
                    let mut missing_somewhere = false;
                    for backend in enabled_backends(&self.features) {
                        if matches!(
                            self.store.report_link(incident.id, backend).await,
                            Ok(None)
                        ) {
                            missing_somewhere = true;
                        }
                    }
                    if missing_somewhere {
                        due.push(ReminderKind::ReportPending);
                    }
                }
            }
        }

        due
    }

    async fn send(
        &self,
        incident: &incident::Incident,
        kind: ReminderKind,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let message = match kind {
            ReminderKind::NoRecentUpdate => ChatMessage {
                target: ChannelTarget::Incident(incident.id),
                title: format!("No updates on {}", incident.title),
                body: format!(
                    "This {} incident has had no ledger activity for over {}h. Post a status update.",
                    incident.priority,
                    self.config.stale_after.num_hours()
                ),
                severity: Severity::Warning,
            },
            ReminderKind::ReportPending => ChatMessage {
                target: ChannelTarget::Incident(incident.id),
                title: format!("Post-incident report overdue for {}", incident.title),
                body: format!(
                    "Mitigated over {} days ago and the report is still missing (as of {}).",
                    self.config.report_pending_after.num_days(),
                    now.format("%Y-%m-%d")
                ),
                severity: Severity::Warning,
            },
        };
        self.chat.post(&message).await?;
        Ok(())
    }

    /// Run the scanner on a fixed cadence until the task is dropped.
    pub async fn run(self: Arc<Self>, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.scan_once(Utc::now()).await;
        }
    }
}
