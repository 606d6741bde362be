//! The lifecycle engine: single mutation entry point for incidents.
//!
//! `transition()` runs diff -> validate -> persist under the per-incident
//! row lock, so concurrent writers serialize and the second one validates
//! against committed state. The lock is released before handler fan-out;
//! the serialized commit already fixes per-incident event order, and
//! holding the lock across handler I/O would stall every later writer.
//! The mutation path performs no network I/O; the report readiness probe
//! only runs behind the `is_closable` query.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::Features;
use crate::error::{CloseBlocker, StoreError, TransitionError, ValidationError};
use crate::events::{ChangedField, Dispatcher, LifecycleEvent};
use crate::ledger::{requires_report, Ledger, ReportReadiness};
use crate::model::{
    ClosureReason, EventType, Incident, IncidentId, Milestone, Priority, Update,
};
use crate::status::Status;
use crate::store::IncidentStore;

/// Typed mutation request carrying only the allowed mutable fields.
#[derive(Debug, Clone, Default)]
pub struct TransitionRequest {
    /// Requested status, if the status should change
    pub status: Option<Status>,
    /// New priority
    pub priority: Option<Priority>,
    /// New category
    pub category: Option<String>,
    /// New commander
    pub commander: Option<String>,
    /// New title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// Free-text message for the ledger entry
    pub message: Option<String>,
    /// Justification; only valid when closing from an early status
    pub closure_reason: Option<ClosureReason>,
    /// Milestone to record as a key event
    pub milestone: Option<Milestone>,
    /// Optimistic concurrency check: fail with a conflict if the incident
    /// is no longer in this status when the lock is acquired
    pub expected_status: Option<Status>,
    /// Ledger tag override; the tracker bridge sets `TrackerStatusSync`
    pub event_type: Option<EventType>,
}

impl TransitionRequest {
    /// Request a status change.
    #[must_use]
    pub fn status_change(target: Status) -> Self {
        Self {
            status: Some(target),
            ..Self::default()
        }
    }

    /// Request a milestone key event.
    #[must_use]
    pub fn key_event(milestone: Milestone) -> Self {
        Self {
            milestone: Some(milestone),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_closure_reason(mut self, reason: ClosureReason) -> Self {
        self.closure_reason = Some(reason);
        self
    }

    #[must_use]
    pub fn with_expected_status(mut self, expected: Status) -> Self {
        self.expected_status = Some(expected);
        self
    }

    #[must_use]
    pub fn from_tracker(mut self) -> Self {
        self.event_type = Some(EventType::TrackerStatusSync);
        self
    }
}

/// Single mutation entry point for incidents.
pub struct LifecycleEngine {
    store: IncidentStore,
    ledger: Ledger,
    features: Features,
    readiness: Arc<dyn ReportReadiness>,
    dispatcher: Dispatcher,
}

impl LifecycleEngine {
    #[must_use]
    pub fn new(
        store: IncidentStore,
        features: Features,
        readiness: Arc<dyn ReportReadiness>,
        dispatcher: Dispatcher,
    ) -> Self {
        let ledger = Ledger::new(store.clone());
        Self {
            store,
            ledger,
            features,
            readiness,
            dispatcher,
        }
    }

    #[must_use]
    pub fn store(&self) -> &IncidentStore {
        &self.store
    }

    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    #[must_use]
    pub const fn features(&self) -> &Features {
        &self.features
    }

    /// Whether the incident mandates a post-incident report.
    #[must_use]
    pub fn requires_report(&self, incident: &Incident) -> bool {
        requires_report(incident, &self.features)
    }

    /// Whether the incident could close right now, with the blockers if
    /// not.
    ///
    /// A query surface for REST and chat callers; `transition()` never
    /// consults it, so the readiness probe's network I/O stays off the
    /// locked mutation path.
    pub async fn is_closable(
        &self,
        id: IncidentId,
    ) -> Result<(bool, Vec<CloseBlocker>), StoreError> {
        let incident = self.store.get(id).await?;
        self.ledger
            .is_closable(&incident, false, &self.features, self.readiness.as_ref())
            .await
    }

    /// Declare a new incident and record the declaration in its ledger.
    pub async fn declare(&self, incident: Incident) -> Incident {
        let id = self.store.insert(incident.clone()).await;
        let update = Update {
            id: Uuid::new_v4(),
            incident_id: id,
            new_status: Some(Status::Open),
            new_priority: None,
            new_category: None,
            new_commander: None,
            milestone: None,
            message: format!("Incident declared: {}", incident.title),
            event_type: EventType::StatusChange,
            actor: Some(incident.creator.clone()),
            created_at: Utc::now(),
        };
        // Insert just happened; the apply cannot miss.
        let _ = self.store.apply(incident.clone(), update).await;
        info!(incident_id = %id, priority = %incident.priority, "Incident declared");
        incident
    }

    /// Apply a mutation request to an incident.
    ///
    /// Validation and conflict failures create no ledger entry. Handler
    /// failures after the commit are logged by the dispatcher and never
    /// rolled back; the internal state change is authoritative.
    #[instrument(skip(self, request), fields(incident_id = %id))]
    pub async fn transition(
        &self,
        id: IncidentId,
        request: TransitionRequest,
        actor: Option<&str>,
    ) -> Result<Update, TransitionError> {
        let guard = self
            .store
            .lock_incident(id)
            .await
            .map_err(|_| TransitionError::NotFound(id))?;

        let current = self
            .store
            .get(id)
            .await
            .map_err(|_| TransitionError::NotFound(id))?;

        if let Some(expected) = request.expected_status {
            if expected != current.status {
                return Err(TransitionError::Conflict(format!(
                    "expected status {expected}, incident is {}",
                    current.status
                )));
            }
        }

        let (next, changed) = self.validate(&current, &request).await?;

        let update = build_update(&next, &request, &changed, actor);
        self.store
            .apply(next.clone(), update.clone())
            .await
            .map_err(|_| TransitionError::NotFound(id))?;

        info!(
            status = %next.status,
            event_type = update.event_type.as_str(),
            actor = actor.unwrap_or("system"),
            "Transition committed"
        );

        // The commit fixed this update's place in the ledger; release the
        // row before handler I/O so other writers (and handlers performing
        // follow-up transitions) are not blocked behind it.
        drop(guard);

        let event = LifecycleEvent {
            incident: next,
            update: update.clone(),
            changed,
        };
        self.dispatcher.dispatch(&event).await;

        Ok(update)
    }

    /// Reopen a closed incident.
    ///
    /// Deliberately not an edge in the transition table: the target must be
    /// `Investigating` or `Mitigating` and the justification must carry at
    /// least ten characters.
    #[instrument(skip(self, justification), fields(incident_id = %id))]
    pub async fn reopen(
        &self,
        id: IncidentId,
        target: Status,
        justification: &str,
        actor: &str,
    ) -> Result<Update, TransitionError> {
        let guard = self
            .store
            .lock_incident(id)
            .await
            .map_err(|_| TransitionError::NotFound(id))?;

        let current = self
            .store
            .get(id)
            .await
            .map_err(|_| TransitionError::NotFound(id))?;

        if current.status != Status::Closed {
            return Err(ValidationError::Reopen(format!(
                "incident is {}, only closed incidents can reopen",
                current.status
            ))
            .into());
        }
        if !matches!(target, Status::Investigating | Status::Mitigating) {
            return Err(ValidationError::Reopen(format!(
                "cannot reopen into {target}"
            ))
            .into());
        }
        if justification.trim().len() < 10 {
            return Err(ValidationError::Reopen(
                "justification must be at least 10 characters".to_string(),
            )
            .into());
        }

        let mut next = current;
        next.status = target;
        next.closed_at = None;
        next.closure_reason = None;

        let update = Update {
            id: Uuid::new_v4(),
            incident_id: id,
            new_status: Some(target),
            new_priority: None,
            new_category: None,
            new_commander: None,
            milestone: None,
            message: justification.trim().to_string(),
            event_type: EventType::Reopen,
            actor: Some(actor.to_string()),
            created_at: Utc::now(),
        };
        self.store
            .apply(next.clone(), update.clone())
            .await
            .map_err(|_| TransitionError::NotFound(id))?;

        info!(target = %target, actor, "Incident reopened");

        drop(guard);

        let event = LifecycleEvent {
            incident: next,
            update: update.clone(),
            changed: vec![ChangedField::Status],
        };
        self.dispatcher.dispatch(&event).await;

        Ok(update)
    }

    /// Validate the request against committed state and produce the next
    /// incident snapshot plus the field diff.
    async fn validate(
        &self,
        current: &Incident,
        request: &TransitionRequest,
    ) -> Result<(Incident, Vec<ChangedField>), TransitionError> {
        let mut next = current.clone();
        let mut changed = Vec::new();

        if let Some(target) = request.status {
            if target == current.status {
                // Only reachable from a stale read; callers retry with
                // fresh state rather than re-prompting the user.
                return Err(TransitionError::Conflict(format!(
                    "incident already in status {target}"
                )));
            }

            let needs_report = requires_report(current, &self.features);
            if !current.status.can_transition_to(target, needs_report) {
                return Err(ValidationError::IllegalTransition {
                    current: current.status,
                    target,
                }
                .into());
            }

            let early_close = Status::requires_closure_reason(current.status, target);
            if early_close && request.closure_reason.is_none() {
                return Err(ValidationError::MissingClosureReason {
                    current: current.status,
                }
                .into());
            }
            if request.closure_reason.is_some() && !early_close {
                return Err(ValidationError::UnexpectedClosureReason.into());
            }

            next.status = target;
            if target == Status::Closed {
                next.closed_at = Some(Utc::now());
                next.closure_reason = if early_close {
                    request.closure_reason
                } else {
                    None
                };
            }
            changed.push(ChangedField::Status);
        } else if request.closure_reason.is_some() {
            return Err(ValidationError::UnexpectedClosureReason.into());
        }

        if let Some(milestone) = request.milestone {
            let recorded = self
                .store
                .milestone_recorded(current.id, milestone)
                .await
                .map_err(|_| TransitionError::NotFound(current.id))?;
            if recorded {
                return Err(ValidationError::DuplicateMilestone(milestone).into());
            }
        }

        if let Some(priority) = request.priority {
            if priority != current.priority {
                next.priority = priority;
                changed.push(ChangedField::Priority);
            }
        }
        if let Some(category) = &request.category {
            if *category != current.category {
                next.category.clone_from(category);
                changed.push(ChangedField::Category);
            }
        }
        if let Some(commander) = &request.commander {
            if current.commander.as_deref() != Some(commander) {
                next.commander = Some(commander.clone());
                changed.push(ChangedField::Commander);
            }
        }
        if let Some(title) = &request.title {
            if *title != current.title {
                next.title.clone_from(title);
                changed.push(ChangedField::Title);
            }
        }
        if let Some(description) = &request.description {
            if *description != current.description {
                next.description.clone_from(description);
                changed.push(ChangedField::Description);
            }
        }

        if changed.is_empty() && request.milestone.is_none() && request.message.is_none() {
            return Err(ValidationError::EmptyRequest.into());
        }

        Ok((next, changed))
    }
}

/// Build the ledger entry for a validated transition.
fn build_update(
    next: &Incident,
    request: &TransitionRequest,
    changed: &[ChangedField],
    actor: Option<&str>,
) -> Update {
    let event_type = request.event_type.unwrap_or_else(|| {
        if request.milestone.is_some() {
            EventType::KeyEvent
        } else if request.status == Some(Status::Closed) {
            EventType::Closure
        } else if changed.contains(&ChangedField::Status) {
            EventType::StatusChange
        } else {
            EventType::FieldChange
        }
    });

    Update {
        id: Uuid::new_v4(),
        incident_id: next.id,
        new_status: request.status,
        new_priority: request.priority,
        new_category: request.category.clone(),
        new_commander: request.commander.clone(),
        milestone: request.milestone,
        message: request.message.clone().unwrap_or_default(),
        event_type,
        actor: actor.map(ToString::to_string),
        created_at: Utc::now(),
    }
}
