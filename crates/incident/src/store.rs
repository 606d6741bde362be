//! In-process incident store.
//!
//! The incident row and its ledger are the only transactionally-mutated
//! resources: `apply()` swaps the incident and appends the ledger entry
//! under one write lock. Per-incident serialization of the engine's
//! diff-validate-persist sequence uses the owned mutex handed out by
//! `lock_incident()`. Report-link uniqueness is enforced here on insert,
//! not by caller discipline.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::error::StoreError;
use crate::model::{
    Incident, IncidentId, Milestone, ReportBackendKind, ReportLink, TrackerTicket, Update,
};

/// Losing side of a report-link insert race.
#[derive(Debug, Clone)]
pub struct LinkExists(pub ReportLink);

#[derive(Debug)]
struct Record {
    incident: Incident,
    updates: Vec<Update>,
    report_links: HashMap<ReportBackendKind, ReportLink>,
    ticket: Option<TrackerTicket>,
    sent_markers: HashSet<String>,
    row_lock: Arc<Mutex<()>>,
}

impl Record {
    fn new(incident: Incident) -> Self {
        Self {
            incident,
            updates: Vec::new(),
            report_links: HashMap::new(),
            ticket: None,
            sent_markers: HashSet::new(),
            row_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Shared in-memory store for incidents and their satellite records.
#[derive(Debug, Clone, Default)]
pub struct IncidentStore {
    inner: Arc<RwLock<HashMap<IncidentId, Record>>>,
}

impl IncidentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly declared incident.
    pub async fn insert(&self, incident: Incident) -> IncidentId {
        let id = incident.id;
        self.inner.write().await.insert(id, Record::new(incident));
        id
    }

    /// Snapshot of the incident, if present.
    pub async fn get(&self, id: IncidentId) -> Result<Incident, StoreError> {
        self.inner
            .read()
            .await
            .get(&id)
            .map(|r| r.incident.clone())
            .ok_or(StoreError::NotFound(id))
    }

    /// All incidents, for periodic scans.
    pub async fn list(&self) -> Vec<Incident> {
        self.inner
            .read()
            .await
            .values()
            .map(|r| r.incident.clone())
            .collect()
    }

    /// Acquire the per-incident row lock.
    ///
    /// The engine holds this across its diff-validate-persist sequence so a
    /// second writer validates against post-commit state, never a stale read.
    pub async fn lock_incident(
        &self,
        id: IncidentId,
    ) -> Result<OwnedMutexGuard<()>, StoreError> {
        let lock = {
            let records = self.inner.read().await;
            let record = records.get(&id).ok_or(StoreError::NotFound(id))?;
            Arc::clone(&record.row_lock)
        };
        Ok(lock.lock_owned().await)
    }

    /// Persist a mutated incident together with the ledger entry describing
    /// the change. Both land under one write lock; neither is visible
    /// without the other.
    pub async fn apply(
        &self,
        incident: Incident,
        update: Update,
    ) -> Result<(), StoreError> {
        let mut records = self.inner.write().await;
        let record = records
            .get_mut(&incident.id)
            .ok_or(StoreError::NotFound(incident.id))?;
        record.incident = incident;
        record.updates.push(update);
        Ok(())
    }

    /// Ordered ledger for an incident, oldest first.
    pub async fn updates(&self, id: IncidentId) -> Result<Vec<Update>, StoreError> {
        self.inner
            .read()
            .await
            .get(&id)
            .map(|r| r.updates.clone())
            .ok_or(StoreError::NotFound(id))
    }

    /// Whether a key-event ledger entry exists for the milestone.
    pub async fn milestone_recorded(
        &self,
        id: IncidentId,
        milestone: Milestone,
    ) -> Result<bool, StoreError> {
        self.inner
            .read()
            .await
            .get(&id)
            .map(|r| r.updates.iter().any(|u| u.milestone == Some(milestone)))
            .ok_or(StoreError::NotFound(id))
    }

    /// Insert a report link, enforcing at-most-one per (incident, backend).
    ///
    /// A losing racer gets the surviving link back and must treat the
    /// outcome as success-by-detection.
    pub async fn insert_report_link(
        &self,
        link: ReportLink,
    ) -> Result<Result<ReportLink, LinkExists>, StoreError> {
        let mut records = self.inner.write().await;
        let record = records
            .get_mut(&link.incident_id)
            .ok_or(StoreError::NotFound(link.incident_id))?;
        if let Some(existing) = record.report_links.get(&link.backend) {
            return Ok(Err(LinkExists(existing.clone())));
        }
        record.report_links.insert(link.backend, link.clone());
        Ok(Ok(link))
    }

    /// Report link for one backend, if created.
    pub async fn report_link(
        &self,
        id: IncidentId,
        backend: ReportBackendKind,
    ) -> Result<Option<ReportLink>, StoreError> {
        self.inner
            .read()
            .await
            .get(&id)
            .map(|r| r.report_links.get(&backend).cloned())
            .ok_or(StoreError::NotFound(id))
    }

    /// Attach or refresh the mirrored tracker ticket.
    pub async fn set_ticket(&self, ticket: TrackerTicket) -> Result<(), StoreError> {
        let mut records = self.inner.write().await;
        let record = records
            .get_mut(&ticket.incident_id)
            .ok_or(StoreError::NotFound(ticket.incident_id))?;
        record.ticket = Some(ticket);
        Ok(())
    }

    /// Mirrored tracker ticket, if the incident is linked.
    pub async fn ticket(&self, id: IncidentId) -> Result<Option<TrackerTicket>, StoreError> {
        self.inner
            .read()
            .await
            .get(&id)
            .map(|r| r.ticket.clone())
            .ok_or(StoreError::NotFound(id))
    }

    /// Resolve an incident from its tracker key (inbound webhook path).
    pub async fn find_by_ticket_key(&self, key: &str) -> Option<Incident> {
        self.inner
            .read()
            .await
            .values()
            .find(|r| r.ticket.as_ref().is_some_and(|t| t.external_key == key))
            .map(|r| r.incident.clone())
    }

    /// Record that a one-shot notification was sent.
    ///
    /// Returns `true` the first time a marker is recorded; callers check
    /// this before sending so reminders go out at most once per marker.
    pub async fn record_sent_marker(
        &self,
        id: IncidentId,
        marker: &str,
    ) -> Result<bool, StoreError> {
        let mut records = self.inner.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        Ok(record.sent_markers.insert(marker.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Environment, Priority};
    use chrono::Utc;

    fn fixture() -> Incident {
        Incident::declare(
            "DB latency",
            "p99 above threshold",
            Priority::P2,
            Environment::Production,
            "availability",
            "bob",
        )
    }

    fn link(incident_id: IncidentId, external_id: &str) -> ReportLink {
        ReportLink {
            incident_id,
            backend: ReportBackendKind::Wiki,
            external_id: external_id.to_string(),
            url: None,
            created_at: Utc::now(),
            created_by: None,
        }
    }

    #[tokio::test]
    async fn report_link_insert_is_unique_per_backend() {
        let store = IncidentStore::new();
        let id = store.insert(fixture()).await;

        let first = store.insert_report_link(link(id, "PAGE-1")).await.unwrap();
        assert!(first.is_ok());

        let second = store.insert_report_link(link(id, "PAGE-2")).await.unwrap();
        let existing = second.expect_err("second insert must lose");
        assert_eq!(existing.0.external_id, "PAGE-1");
    }

    #[tokio::test]
    async fn sent_marker_recorded_once() {
        let store = IncidentStore::new();
        let id = store.insert(fixture()).await;

        assert!(store.record_sent_marker(id, "report_pending").await.unwrap());
        assert!(!store.record_sent_marker(id, "report_pending").await.unwrap());
        assert!(store.record_sent_marker(id, "no_recent_update").await.unwrap());
    }

    #[tokio::test]
    async fn find_by_ticket_key_resolves_linked_incident() {
        let store = IncidentStore::new();
        let incident = fixture();
        let id = store.insert(incident.clone()).await;
        store
            .set_ticket(TrackerTicket {
                incident_id: id,
                external_id: "10001".to_string(),
                external_key: "OPS-42".to_string(),
                summary: incident.title,
                description: incident.description,
                tracker_priority: "Highest".to_string(),
                impact: "production".to_string(),
                external_status: "Open".to_string(),
                reporter: None,
            })
            .await
            .unwrap();

        assert_eq!(store.find_by_ticket_key("OPS-42").await.unwrap().id, id);
        assert!(store.find_by_ticket_key("OPS-999").await.is_none());
    }

    #[tokio::test]
    async fn missing_incident_is_not_found() {
        let store = IncidentStore::new();
        let bogus = uuid::Uuid::new_v4();
        assert!(matches!(
            store.get(bogus).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.lock_incident(bogus).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
