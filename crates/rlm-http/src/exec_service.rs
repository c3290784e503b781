//! The execution-plane HTTP service.
//!
//! Endpoint set and status codes:
//!
//! - `POST /session` → 200 `{session_id}` | 503 `{error: "capacity_exhausted"}`
//! - `POST /session/{id}/execute` → 200 outputs | 404 `{error: "no_such_session"}`
//! - `DELETE /session/{id}` → 204, idempotent
//! - `GET /health` → 200 once the runtime is up
//! - `GET /ready` → 200 when accepting sessions, 503 while warming or full
//! - `GET /sessions` → observability listing

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use rlm_core::{ExecOutputs, SessionError, SessionId};
use rlm_sandbox::{SessionInfo, SessionManager};

#[derive(Clone)]
pub struct ExecServiceState {
    pub manager: Arc<SessionManager>,
    ready: Arc<AtomicBool>,
}

impl ExecServiceState {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        ExecServiceState { manager, ready: Arc::new(AtomicBool::new(false)) }
    }

    /// Warm the interpreter machinery with a throwaway session so the
    /// first real request does not pay interpreter start-up, then flip
    /// the readiness gate.
    pub async fn warm_up(&self) {
        match self.manager.create_session(Some("warmup".into())) {
            Ok(id) => {
                if let Err(err) = self.manager.execute(&id, "pass", None).await {
                    warn!(error = %err, "warm-up execution failed");
                }
                self.manager.destroy_session(&id).await;
                info!("execution plane warmed up");
            }
            Err(err) => warn!(error = %err, "warm-up session failed"),
        }
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub owner_tag: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionInfo>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    fn named(name: &str) -> Json<ErrorBody> {
        Json(ErrorBody { error: name.to_string() })
    }
}

/// Build the execution-plane router.
pub fn exec_router(state: ExecServiceState) -> Router {
    Router::new()
        .route("/session", post(create_session))
        .route("/session/{session_id}/execute", post(execute))
        .route("/session/{session_id}", delete(destroy_session))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/sessions", get(list_sessions))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn create_session(
    State(state): State<ExecServiceState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<Json<CreateSessionResponse>, (StatusCode, Json<ErrorBody>)> {
    let owner_tag = body.and_then(|Json(req)| req.owner_tag);
    match state.manager.create_session(owner_tag) {
        Ok(session_id) => Ok(Json(CreateSessionResponse { session_id })),
        Err(err @ SessionError::CapacityExhausted { .. }) => {
            Err((StatusCode::SERVICE_UNAVAILABLE, ErrorBody::named(err.wire_name())))
        }
        Err(err) => Err((StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::named(err.wire_name()))),
    }
}

async fn execute(
    State(state): State<ExecServiceState>,
    Path(session_id): Path<String>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecOutputs>, (StatusCode, Json<ErrorBody>)> {
    let id = SessionId::from_string(session_id);
    match state.manager.execute(&id, &request.code, request.timeout_ms).await {
        Ok(outputs) => Ok(Json(outputs)),
        Err(err @ SessionError::NoSuchSession(_)) => {
            Err((StatusCode::NOT_FOUND, ErrorBody::named(err.wire_name())))
        }
        Err(err @ SessionError::CodeTooLarge { .. }) => {
            Err((StatusCode::BAD_REQUEST, ErrorBody::named(err.wire_name())))
        }
        Err(err) => Err((StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::named(err.wire_name()))),
    }
}

async fn destroy_session(
    State(state): State<ExecServiceState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    let id = SessionId::from_string(session_id);
    state.manager.destroy_session(&id).await;
    StatusCode::NO_CONTENT
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn ready(State(state): State<ExecServiceState>) -> (StatusCode, Json<serde_json::Value>) {
    let warmed = state.ready.load(Ordering::SeqCst);
    let has_capacity = state.manager.live_count() < state.manager.config().max_sessions;
    if warmed && has_capacity {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "not_ready" })),
        )
    }
}

async fn list_sessions(State(state): State<ExecServiceState>) -> Json<SessionsResponse> {
    Json(SessionsResponse { sessions: state.manager.list_sessions() })
}
