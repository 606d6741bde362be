//! Background webhook queue.
//!
//! The webhook handler acknowledges the tracker immediately and hands the
//! raw payload to a worker task; the tracker's delivery timeout is short
//! and processing can involve engine transitions and chat calls. Transient
//! failures are retried a bounded number of times with a fixed delay;
//! structural failures are dropped after logging, since redelivery would
//! fail identically.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chatops::NotificationDispatcher;
use tracker_sync::{InboundOutcome, InboundProcessor, SyncError, WebhookEnvelope};

/// Sender half handed to the HTTP layer.
#[derive(Clone)]
pub struct WebhookQueue {
    tx: mpsc::Sender<Vec<u8>>,
}

impl WebhookQueue {
    /// Create the queue with a bounded capacity.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue a payload without blocking; `false` means the queue is full
    /// and the caller should signal backpressure to the tracker.
    #[must_use]
    pub fn try_enqueue(&self, payload: Vec<u8>) -> bool {
        self.tx.try_send(payload).is_ok()
    }
}

/// Worker draining the webhook queue.
pub struct WebhookWorker {
    processor: InboundProcessor,
    notifications: Arc<NotificationDispatcher>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl WebhookWorker {
    #[must_use]
    pub fn new(processor: InboundProcessor, notifications: Arc<NotificationDispatcher>) -> Self {
        Self {
            processor,
            notifications,
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }

    /// Drain the queue until the sender side is dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<Vec<u8>>) {
        info!("Webhook worker started");
        while let Some(payload) = rx.recv().await {
            self.process(&payload).await;
        }
        info!("Webhook worker stopped");
    }

    async fn process(&self, payload: &[u8]) {
        let envelope = match WebhookEnvelope::parse(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping malformed webhook payload");
                return;
            }
        };

        for attempt in 1..=self.max_attempts {
            match self.processor.process(envelope.clone()).await {
                Ok(outcome) => {
                    self.handle_outcome(outcome).await;
                    return;
                }
                Err(e) if is_transient(&e) && attempt < self.max_attempts => {
                    warn!(
                        issue = %envelope.issue.key,
                        attempt,
                        error = %e,
                        "Webhook processing failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    warn!(issue = %envelope.issue.key, error = %e, "Webhook processing abandoned");
                    return;
                }
            }
        }
    }

    async fn handle_outcome(&self, outcome: InboundOutcome) {
        match outcome {
            InboundOutcome::Applied(updates) => {
                debug!(count = updates.len(), "Inbound webhook applied");
            }
            InboundOutcome::Unlinked => {
                debug!("Webhook for unlinked issue ignored");
            }
            InboundOutcome::Comment {
                issue_key,
                author,
                body,
                event,
            } => {
                if event == "comment_created" {
                    if let Err(e) = self
                        .notifications
                        .relay_tracker_comment(&issue_key, &author, &body)
                        .await
                    {
                        warn!(issue = %issue_key, error = %e, "Comment relay failed");
                    }
                } else {
                    debug!(issue = %issue_key, event = %event, "Comment edit ignored");
                }
            }
        }
    }
}

/// Whether an error is worth retrying.
fn is_transient(error: &SyncError) -> bool {
    match error {
        SyncError::Http(_) => true,
        SyncError::Api { status, .. } => *status >= 500,
        _ => false,
    }
}
