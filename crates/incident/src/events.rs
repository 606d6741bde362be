//! Typed lifecycle events and the ordered dispatcher.
//!
//! The engine publishes one event per committed transition; handlers run
//! synchronously in the order they were registered. Registration order is
//! fixed by the server wiring (report orchestrator, then tracker sync, then
//! notifications) so reminder messages can reference a freshly created
//! report link.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::model::{Incident, Update};

/// Incident field touched by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangedField {
    Status,
    Priority,
    Category,
    Commander,
    Title,
    Description,
}

/// Event emitted after a transition has been persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Post-change snapshot of the incident
    pub incident: Incident,
    /// The ledger entry describing the change
    pub update: Update,
    /// Field names the transition touched
    pub changed: Vec<ChangedField>,
}

impl LifecycleEvent {
    /// Whether the transition touched `field`.
    #[must_use]
    pub fn changed(&self, field: ChangedField) -> bool {
        self.changed.contains(&field)
    }
}

/// A reactive component consuming lifecycle events.
///
/// Handler failures are integration failures by definition; they are logged
/// and never propagated back into the transition that produced the event.
#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    /// Handler name for logs.
    fn name(&self) -> &'static str;

    /// React to a committed transition.
    async fn handle(&self, event: &LifecycleEvent) -> anyhow::Result<()>;
}

/// Dispatches lifecycle events to handlers in fixed order.
#[derive(Default)]
pub struct Dispatcher {
    handlers: Vec<Arc<dyn LifecycleHandler>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler; dispatch order is append order.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn LifecycleHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Run every handler against the event, sequentially.
    pub async fn dispatch(&self, event: &LifecycleEvent) {
        for handler in &self.handlers {
            let name = handler.name();
            match handler.handle(event).await {
                Ok(()) => {
                    debug!(
                        handler = name,
                        incident_id = %event.incident.id,
                        "Lifecycle handler completed"
                    );
                }
                Err(e) => {
                    error!(
                        handler = name,
                        incident_id = %event.incident.id,
                        error = %e,
                        "Lifecycle handler failed"
                    );
                }
            }
        }
    }
}
