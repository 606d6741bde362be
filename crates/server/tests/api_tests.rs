//! API tests: REST surface, error mapping, and the webhook receive path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;

use chatops::{ChannelError, ChatMessage, ChatSink, NotificationDispatcher};
use incident::{
    Dispatcher, Environment, Features, Incident, IncidentStore, LifecycleEngine, Priority,
    ReadinessProbeError, ReportLink, ReportReadiness, Status, TrackerTicket,
};
use incident_server::{build_router, AppState, WebhookQueue, WebhookWorker};
use tracker_sync::InboundProcessor;

struct AlwaysReady;

#[async_trait]
impl ReportReadiness for AlwaysReady {
    async fn is_ready(&self, _link: &ReportLink) -> Result<bool, ReadinessProbeError> {
        Ok(true)
    }
}

struct NullChat;

#[async_trait]
impl ChatSink for NullChat {
    async fn post(&self, _message: &ChatMessage) -> Result<(), ChannelError> {
        Ok(())
    }
}

struct Harness {
    state: AppState,
    store: IncidentStore,
}

fn harness(secret: Option<&str>, queue_capacity: usize) -> Harness {
    let store = IncidentStore::new();
    let features = Features::all();
    let engine = Arc::new(LifecycleEngine::new(
        store.clone(),
        features,
        Arc::new(AlwaysReady),
        Dispatcher::new(),
    ));

    let (queue, rx) = WebhookQueue::new(queue_capacity);
    let notifications = Arc::new(NotificationDispatcher::new(
        Arc::new(NullChat),
        store.clone(),
        features,
    ));
    let worker = WebhookWorker::new(InboundProcessor::new(Arc::clone(&engine)), notifications);
    tokio::spawn(worker.run(rx));

    Harness {
        state: AppState {
            engine,
            queue,
            webhook_secret: secret.map(ToString::to_string),
        },
        store,
    }
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn sign(body: &[u8], secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[tokio::test]
async fn health_check_responds() {
    let app = build_router(harness(None, 8).state);
    let response = app
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn declare_then_fetch_incident() {
    let app = build_router(harness(None, 8).state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/incidents",
            json!({
                "title": "API outage",
                "description": "5xx spike",
                "priority": "p1",
                "environment": "production",
                "category": "availability",
                "creator": "alice"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "open");

    let response = app
        .oneshot(
            Request::get(format!("/incidents/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = body_json(response).await;
    assert_eq!(fetched["title"], "API outage");
}

#[tokio::test]
async fn declare_carries_custom_fields() {
    let app = build_router(harness(None, 8).state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/incidents",
            json!({
                "title": "Payment errors",
                "description": "declines spiking",
                "priority": "p2",
                "environment": "production",
                "category": "payments",
                "creator": "alice",
                "custom_fields": { "secondary_environment": "staging" }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["custom_fields"]["secondary_environment"], "staging");

    let response = app
        .oneshot(
            Request::get(format!("/incidents/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let fetched = body_json(response).await;
    assert_eq!(fetched["custom_fields"]["secondary_environment"], "staging");
}

#[tokio::test]
async fn closability_endpoint_reports_blockers() {
    let h = harness(None, 8);
    let incident = h
        .state
        .engine
        .declare(Incident::declare(
            "Disk pressure",
            "nodes evicting pods",
            Priority::P3,
            Environment::Production,
            "capacity",
            "bob",
        ))
        .await;
    let app = build_router(h.state);

    let response = app
        .oneshot(
            Request::get(format!("/incidents/{}/closable", incident.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["closable"], false);
    assert_eq!(body["blockers"][0], "incident not yet mitigated");
}

#[tokio::test]
async fn illegal_transition_rejected_as_unprocessable() {
    let h = harness(None, 8);
    let incident = h
        .state
        .engine
        .declare(Incident::declare(
            "DNS flap",
            "intermittent failures",
            Priority::P3,
            Environment::Production,
            "network",
            "bob",
        ))
        .await;
    let app = build_router(h.state);

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/incidents/{}/transitions", incident.id),
            json!({ "status": "mitigated", "actor": "bob" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn stale_expected_status_is_a_conflict() {
    let h = harness(None, 8);
    let incident = h
        .state
        .engine
        .declare(Incident::declare(
            "Cache miss storm",
            "origin load",
            Priority::P3,
            Environment::Production,
            "availability",
            "bob",
        ))
        .await;
    let app = build_router(h.state.clone());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/incidents/{}/transitions", incident.id),
            json!({ "status": "investigating", "actor": "bob" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Second writer still believes the incident is open.
    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/incidents/{}/transitions", incident.id),
            json!({ "status": "investigating", "expected_status": "open", "actor": "carol" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_incident_is_not_found() {
    let app = build_router(harness(None, 8).state);
    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/incidents/{}/transitions", uuid::Uuid::new_v4()),
            json!({ "status": "investigating" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn webhook_without_valid_signature_is_unauthorized() {
    let app = build_router(harness(Some("secret"), 8).state);
    let payload = json!({
        "webhookEvent": "issue_updated",
        "issue": { "id": "1", "key": "OPS-1" }
    })
    .to_string();

    let response = app
        .clone()
        .oneshot(
            Request::post("/webhooks/tracker")
                .body(Body::from(payload.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::post("/webhooks/tracker")
                .header("x-tracker-signature", sign(payload.as_bytes(), "wrong"))
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signed_webhook_is_accepted_and_applied() {
    let h = harness(Some("secret"), 8);
    let incident = h
        .state
        .engine
        .declare(Incident::declare(
            "Queue backlog",
            "consumer lag",
            Priority::P2,
            Environment::Production,
            "availability",
            "alice",
        ))
        .await;
    h.store
        .set_ticket(TrackerTicket {
            incident_id: incident.id,
            external_id: "10001".to_string(),
            external_key: "OPS-1".to_string(),
            summary: incident.title.clone(),
            description: incident.description.clone(),
            tracker_priority: "High".to_string(),
            impact: "production".to_string(),
            external_status: "Open".to_string(),
            reporter: None,
        })
        .await
        .unwrap();
    let app = build_router(h.state.clone());

    let payload = json!({
        "webhookEvent": "issue_updated",
        "issue": { "id": "10001", "key": "OPS-1" },
        "changelog": { "items": [
            { "field": "status", "fromString": "Open", "toString": "In Progress" }
        ]},
        "user": { "displayName": "Grace" }
    })
    .to_string();

    let response = app
        .oneshot(
            Request::post("/webhooks/tracker")
                .header("x-tracker-signature", sign(payload.as_bytes(), "secret"))
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // Processing is asynchronous; poll until the worker applies it.
    let mut status = Status::Open;
    for _ in 0..100 {
        status = h.store.get(incident.id).await.unwrap().status;
        if status != Status::Open {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, Status::Investigating);
}

#[tokio::test]
async fn full_queue_signals_backpressure() {
    // No worker is draining this queue, so the second delivery must be
    // turned away for redelivery.
    let store = IncidentStore::new();
    let engine = Arc::new(LifecycleEngine::new(
        store,
        Features::all(),
        Arc::new(AlwaysReady),
        Dispatcher::new(),
    ));
    let (queue, _rx) = WebhookQueue::new(1);
    let app = build_router(AppState {
        engine,
        queue,
        webhook_secret: None,
    });

    let payload = json!({
        "webhookEvent": "issue_updated",
        "issue": { "id": "1", "key": "OPS-9" }
    })
    .to_string();

    let first = app
        .clone()
        .oneshot(
            Request::post("/webhooks/tracker")
                .body(Body::from(payload.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = app
        .oneshot(
            Request::post("/webhooks/tracker")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
}
