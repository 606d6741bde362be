//! HTTP surface: REST endpoints for incident management and the tracker
//! webhook receiver.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use incident::{
    ClosureReason, Incident, IncidentId, LifecycleEngine, Milestone, Priority, Status,
    TransitionError, TransitionRequest,
};

use crate::queue::WebhookQueue;
use crate::signature::verify_webhook_signature;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The lifecycle engine.
    pub engine: Arc<LifecycleEngine>,
    /// Queue feeding the webhook worker.
    pub queue: WebhookQueue,
    /// Webhook signing secret, when verification is enabled.
    pub webhook_secret: Option<String>,
}

/// Build the HTTP router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/tracker", post(tracker_webhook_handler))
        .route("/incidents", post(declare_incident))
        .route("/incidents/{id}", get(get_incident))
        .route("/incidents/{id}/timeline", get(get_timeline))
        .route("/incidents/{id}/closable", get(get_closability))
        .route("/incidents/{id}/transitions", post(apply_transition))
        .route("/incidents/{id}/reopen", post(reopen_incident))
        .route("/healthz", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Handle incoming tracker webhooks: verify, acknowledge, enqueue.
///
/// Processing happens on the worker; the tracker only needs to know the
/// delivery was accepted.
async fn tracker_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    if let Some(secret) = &state.webhook_secret {
        let Some(signature) = headers
            .get("x-tracker-signature")
            .and_then(|v| v.to_str().ok())
        else {
            warn!("Missing X-Tracker-Signature header");
            return Err(StatusCode::UNAUTHORIZED);
        };
        if !verify_webhook_signature(&body, signature, secret) {
            warn!("Invalid webhook signature");
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    if state.queue.try_enqueue(body.to_vec()) {
        Ok((StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))))
    } else {
        warn!("Webhook queue full, asking tracker to redeliver");
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Request body for declaring an incident.
#[derive(Debug, Deserialize)]
struct DeclareRequest {
    title: String,
    description: String,
    priority: Priority,
    environment: incident::Environment,
    category: String,
    creator: String,
    /// Secondary environment selections and other free-form fields
    #[serde(default)]
    custom_fields: HashMap<String, String>,
}

async fn declare_incident(
    State(state): State<AppState>,
    Json(request): Json<DeclareRequest>,
) -> (StatusCode, Json<Incident>) {
    let mut incident = Incident::declare(
        request.title,
        request.description,
        request.priority,
        request.environment,
        request.category,
        request.creator,
    );
    incident.custom_fields = request.custom_fields;
    let incident = state.engine.declare(incident).await;
    info!(incident_id = %incident.id, "Incident declared via API");
    (StatusCode::CREATED, Json(incident))
}

async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<IncidentId>,
) -> Result<Json<Incident>, StatusCode> {
    state
        .engine
        .store()
        .get(id)
        .await
        .map(Json)
        .map_err(|_| StatusCode::NOT_FOUND)
}

async fn get_timeline(
    State(state): State<AppState>,
    Path(id): Path<IncidentId>,
) -> Result<Json<Value>, StatusCode> {
    let timeline = state
        .engine
        .ledger()
        .timeline(id)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Json(json!({ "incident_id": id, "updates": timeline })))
}

/// Advisory closability check; callers consult it before offering a close
/// action, the engine does not enforce it on normal-progression closes.
async fn get_closability(
    State(state): State<AppState>,
    Path(id): Path<IncidentId>,
) -> Result<Json<Value>, StatusCode> {
    let (closable, blockers) = state
        .engine
        .is_closable(id)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    let blockers: Vec<String> = blockers.iter().map(ToString::to_string).collect();
    Ok(Json(json!({ "closable": closable, "blockers": blockers })))
}

/// Request body for a transition.
#[derive(Debug, Deserialize)]
struct TransitionBody {
    #[serde(default)]
    status: Option<Status>,
    #[serde(default)]
    priority: Option<Priority>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    commander: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    closure_reason: Option<ClosureReason>,
    #[serde(default)]
    milestone: Option<Milestone>,
    #[serde(default)]
    expected_status: Option<Status>,
    #[serde(default)]
    actor: Option<String>,
}

async fn apply_transition(
    State(state): State<AppState>,
    Path(id): Path<IncidentId>,
    Json(body): Json<TransitionBody>,
) -> Result<Json<Value>, StatusCode> {
    let request = TransitionRequest {
        status: body.status,
        priority: body.priority,
        category: body.category,
        commander: body.commander,
        title: body.title,
        description: body.description,
        message: body.message,
        closure_reason: body.closure_reason,
        milestone: body.milestone,
        expected_status: body.expected_status,
        event_type: None,
    };

    match state
        .engine
        .transition(id, request, body.actor.as_deref())
        .await
    {
        Ok(update) => Ok(Json(json!({ "status": "applied", "update": update }))),
        Err(e) => Err(map_transition_error(&e)),
    }
}

/// Request body for reopening a closed incident.
#[derive(Debug, Deserialize)]
struct ReopenRequest {
    target: Status,
    justification: String,
    actor: String,
}

async fn reopen_incident(
    State(state): State<AppState>,
    Path(id): Path<IncidentId>,
    Json(body): Json<ReopenRequest>,
) -> Result<Json<Value>, StatusCode> {
    match state
        .engine
        .reopen(id, body.target, &body.justification, &body.actor)
        .await
    {
        Ok(update) => Ok(Json(json!({ "status": "reopened", "update": update }))),
        Err(e) => Err(map_transition_error(&e)),
    }
}

fn map_transition_error(error: &TransitionError) -> StatusCode {
    warn!(error = %error, "Transition rejected");
    match error {
        TransitionError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TransitionError::Conflict(_) => StatusCode::CONFLICT,
        TransitionError::NotFound(_) => StatusCode::NOT_FOUND,
    }
}
