//! Orchestrator tests: one report per backend, once, with failures
//! isolated per backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatops::{ChannelError, ChatMessage, ChatSink};
use incident::{
    Dispatcher, Environment, Features, Incident, IncidentStore, LifecycleEngine, Priority,
    ReportBackendKind, ReportLink, ReportReadiness, Status, TransitionRequest, Update,
};
use reports::{BackendReadiness, CreatedReport, ReportBackend, ReportError, ReportOrchestrator};

struct FakeBackend {
    kind: ReportBackendKind,
    creates: AtomicUsize,
    fail: bool,
    ready: bool,
}

impl FakeBackend {
    fn new(kind: ReportBackendKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            creates: AtomicUsize::new(0),
            fail: false,
            ready: true,
        })
    }

    fn failing(kind: ReportBackendKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            creates: AtomicUsize::new(0),
            fail: true,
            ready: false,
        })
    }

    fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReportBackend for FakeBackend {
    fn kind(&self) -> ReportBackendKind {
        self.kind
    }

    async fn create(
        &self,
        _incident: &Incident,
        _timeline: &[Update],
    ) -> Result<CreatedReport, ReportError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ReportError::Api {
                status: 503,
                body: "backend down".to_string(),
            });
        }
        Ok(CreatedReport {
            external_id: format!("{}-report", self.kind),
            url: Some(format!("https://example.com/{}-report", self.kind)),
        })
    }

    async fn is_ready(&self, _link: &ReportLink) -> Result<bool, ReportError> {
        if self.fail {
            return Err(ReportError::Api {
                status: 503,
                body: "backend down".to_string(),
            });
        }
        Ok(self.ready)
    }
}

#[derive(Default)]
struct RecordingChat {
    titles: Mutex<Vec<String>>,
}

#[async_trait]
impl ChatSink for RecordingChat {
    async fn post(&self, message: &ChatMessage) -> Result<(), ChannelError> {
        self.titles.lock().unwrap().push(message.title.clone());
        Ok(())
    }
}

fn engine_with_orchestrator(
    store: IncidentStore,
    backends: Vec<Arc<dyn ReportBackend>>,
    chat: Arc<RecordingChat>,
) -> LifecycleEngine {
    let features = Features::all();
    let readiness = Arc::new(BackendReadiness::new(backends.clone()));
    let orchestrator = ReportOrchestrator::new(
        store.clone(),
        features,
        backends,
        chat as Arc<dyn ChatSink>,
    );
    LifecycleEngine::new(
        store,
        features,
        readiness as Arc<dyn ReportReadiness>,
        Dispatcher::new().with_handler(Arc::new(orchestrator)),
    )
}

async fn drive_to_mitigated(engine: &LifecycleEngine, incident: &Incident) {
    for target in [
        Status::Investigating,
        Status::Mitigating,
        Status::Mitigated,
    ] {
        engine
            .transition(
                incident.id,
                TransitionRequest::status_change(target),
                Some("alice"),
            )
            .await
            .unwrap();
    }
}

fn p1_production() -> Incident {
    Incident::declare(
        "Checkout down",
        "payments failing",
        Priority::P1,
        Environment::Production,
        "availability",
        "alice",
    )
}

#[tokio::test]
async fn mitigation_creates_one_report_per_backend() {
    let store = IncidentStore::new();
    let wiki = FakeBackend::new(ReportBackendKind::Wiki);
    let tracker = FakeBackend::new(ReportBackendKind::Tracker);
    let chat = Arc::new(RecordingChat::default());
    let engine = engine_with_orchestrator(
        store.clone(),
        vec![Arc::clone(&wiki) as _, Arc::clone(&tracker) as _],
        Arc::clone(&chat),
    );

    let incident = engine.declare(p1_production()).await;
    drive_to_mitigated(&engine, &incident).await;

    assert_eq!(wiki.create_count(), 1);
    assert_eq!(tracker.create_count(), 1);
    assert!(store
        .report_link(incident.id, ReportBackendKind::Wiki)
        .await
        .unwrap()
        .is_some());
    assert!(store
        .report_link(incident.id, ReportBackendKind::Tracker)
        .await
        .unwrap()
        .is_some());
    assert_eq!(
        chat.titles
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.contains("report started"))
            .count(),
        2
    );
}

#[tokio::test]
async fn repeated_triggers_never_duplicate_reports() {
    let store = IncidentStore::new();
    let wiki = FakeBackend::new(ReportBackendKind::Wiki);
    let tracker = FakeBackend::new(ReportBackendKind::Tracker);
    let chat = Arc::new(RecordingChat::default());
    let engine = engine_with_orchestrator(
        store.clone(),
        vec![Arc::clone(&wiki) as _, Arc::clone(&tracker) as _],
        Arc::clone(&chat),
    );

    let incident = engine.declare(p1_production()).await;
    drive_to_mitigated(&engine, &incident).await;
    // The post-mortem transition fires the handler a second time.
    engine
        .transition(
            incident.id,
            TransitionRequest::status_change(Status::PostMortem),
            Some("alice"),
        )
        .await
        .unwrap();

    assert_eq!(wiki.create_count(), 1);
    assert_eq!(tracker.create_count(), 1);
}

#[tokio::test]
async fn one_failing_backend_does_not_block_the_other() {
    let store = IncidentStore::new();
    let wiki = FakeBackend::failing(ReportBackendKind::Wiki);
    let tracker = FakeBackend::new(ReportBackendKind::Tracker);
    let chat = Arc::new(RecordingChat::default());
    let engine = engine_with_orchestrator(
        store.clone(),
        vec![Arc::clone(&wiki) as _, Arc::clone(&tracker) as _],
        Arc::clone(&chat),
    );

    let incident = engine.declare(p1_production()).await;
    drive_to_mitigated(&engine, &incident).await;

    assert!(store
        .report_link(incident.id, ReportBackendKind::Wiki)
        .await
        .unwrap()
        .is_none());
    assert!(store
        .report_link(incident.id, ReportBackendKind::Tracker)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn failed_backend_retries_on_the_next_trigger() {
    let store = IncidentStore::new();
    let wiki = FakeBackend::failing(ReportBackendKind::Wiki);
    let tracker = FakeBackend::new(ReportBackendKind::Tracker);
    let chat = Arc::new(RecordingChat::default());
    let engine = engine_with_orchestrator(
        store.clone(),
        vec![Arc::clone(&wiki) as _, Arc::clone(&tracker) as _],
        Arc::clone(&chat),
    );

    let incident = engine.declare(p1_production()).await;
    drive_to_mitigated(&engine, &incident).await;
    engine
        .transition(
            incident.id,
            TransitionRequest::status_change(Status::PostMortem),
            Some("alice"),
        )
        .await
        .unwrap();

    // No link exists for the failed backend, so every trigger retries it.
    assert_eq!(wiki.create_count(), 2);
    assert_eq!(tracker.create_count(), 1);
}

#[tokio::test]
async fn low_priority_incidents_get_no_reports() {
    let store = IncidentStore::new();
    let wiki = FakeBackend::new(ReportBackendKind::Wiki);
    let chat = Arc::new(RecordingChat::default());
    let engine = engine_with_orchestrator(
        store.clone(),
        vec![Arc::clone(&wiki) as _],
        Arc::clone(&chat),
    );

    let incident = engine
        .declare(Incident::declare(
            "Minor degradation",
            "slow dashboard",
            Priority::P3,
            Environment::Production,
            "availability",
            "bob",
        ))
        .await;
    drive_to_mitigated(&engine, &incident).await;

    assert_eq!(wiki.create_count(), 0);
    // A next-actions prompt goes out instead of a report.
    assert!(chat
        .titles
        .lock()
        .unwrap()
        .iter()
        .any(|t| t.contains("Next actions")));
}

#[tokio::test]
async fn non_production_incidents_get_no_reports() {
    let store = IncidentStore::new();
    let wiki = FakeBackend::new(ReportBackendKind::Wiki);
    let chat = Arc::new(RecordingChat::default());
    let engine = engine_with_orchestrator(
        store.clone(),
        vec![Arc::clone(&wiki) as _],
        Arc::clone(&chat),
    );

    let incident = engine
        .declare(Incident::declare(
            "Staging outage",
            "deploy pipeline broken",
            Priority::P1,
            Environment::Staging,
            "availability",
            "bob",
        ))
        .await;
    drive_to_mitigated(&engine, &incident).await;

    assert_eq!(wiki.create_count(), 0);
}

#[tokio::test]
async fn readiness_routes_to_the_owning_backend() {
    use chrono::Utc;

    let wiki = FakeBackend::new(ReportBackendKind::Wiki);
    let tracker = FakeBackend::failing(ReportBackendKind::Tracker);
    let readiness = BackendReadiness::new(vec![Arc::clone(&wiki) as _, Arc::clone(&tracker) as _]);

    let link = |backend| ReportLink {
        incident_id: uuid::Uuid::new_v4(),
        backend,
        external_id: "R-1".to_string(),
        url: None,
        created_at: Utc::now(),
        created_by: None,
    };

    assert!(readiness
        .is_ready(&link(ReportBackendKind::Wiki))
        .await
        .unwrap());
    assert!(readiness
        .is_ready(&link(ReportBackendKind::Tracker))
        .await
        .is_err());
}
