//! The inference HTTP surface: one reasoning tree per request.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use rlm_core::{RecursionId, UsageRecord};
use rlm_engine::{Task, TaskCoordinator, TaskError, TaskOptions};

#[derive(Clone)]
pub struct InferServiceState {
    pub coordinator: Arc<TaskCoordinator>,
    /// End-to-end deadline applied to every request, if configured.
    pub request_deadline: Option<Duration>,
}

#[derive(Debug, Deserialize)]
pub struct InferRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_depth: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct InferResponse {
    pub answer: String,
    pub usage: UsageRecord,
    pub recursion_id: Option<RecursionId>,
}

#[derive(Debug, Serialize)]
pub struct InferErrorBody {
    pub error: String,
}

/// Build the inference router.
pub fn infer_router(state: InferServiceState) -> Router {
    Router::new()
        .route("/infer", post(infer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn infer(
    State(state): State<InferServiceState>,
    Json(request): Json<InferRequest>,
) -> Result<Json<InferResponse>, (StatusCode, Json<InferErrorBody>)> {
    let query = match request.query {
        Some(query) if !query.trim().is_empty() => query,
        _ => {
            return Err(bad_request("query is required"));
        }
    };

    let mut task = Task::new(query);
    if let Some(context) = request.context {
        task = task.with_context(context);
    }
    task = task.with_options(TaskOptions {
        max_depth: request.max_depth,
        model: request.model,
        deadline: state.request_deadline,
        ..TaskOptions::default()
    });

    let handle = state.coordinator.submit(task).await;
    let result = handle.join().await;

    match result.error {
        None => Ok(Json(InferResponse {
            answer: result.answer,
            usage: result.usage_total,
            recursion_id: result.recursion_id,
        })),
        Some(TaskError::DeadlineExceeded) => Err((
            StatusCode::GATEWAY_TIMEOUT,
            Json(InferErrorBody { error: "deadline_exceeded".into() }),
        )),
        Some(TaskError::InvalidRequest { detail }) => Err(bad_request(&detail)),
        Some(err) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(InferErrorBody { error: err.to_string() }),
        )),
    }
}

fn bad_request(detail: &str) -> (StatusCode, Json<InferErrorBody>) {
    (StatusCode::BAD_REQUEST, Json(InferErrorBody { error: detail.to_string() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use rlm_core::config::{CoordinatorConfig, SessionConfig};
    use rlm_engine::{
        ControllerConfig, ExecTransport, InProcessTransport, RecursionController, TracingSink,
    };
    use rlm_model::CompletionBackend;
    use rlm_sandbox::SessionManager;
    use rlm_testing::{code_turn, text_turn, MockModel};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        let manager = Arc::new(SessionManager::new(SessionConfig::default()));
        let transport: Arc<dyn ExecTransport> = Arc::new(InProcessTransport::new(manager));
        let mock = Arc::new(MockModel::script(vec![
            code_turn("m-root", "c1", "print(21+21)"),
            text_turn("m-root", "The answer is 42."),
        ]));
        let controller = RecursionController::new(
            mock as Arc<dyn CompletionBackend>,
            transport,
            Arc::new(TracingSink),
            ControllerConfig::new("m-root", vec![], 1),
        );
        let coordinator = Arc::new(TaskCoordinator::new(controller, CoordinatorConfig::default()));
        infer_router(InferServiceState { coordinator, request_deadline: None })
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn infer_answers_with_usage_and_lineage() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/infer")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"query": "print 21+21"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["answer"].as_str().unwrap().contains("42"));
        assert!(body["usage"]["total_tokens"].as_u64().unwrap() > 0);
        assert!(body["recursion_id"].is_string());
    }

    #[tokio::test]
    async fn deadline_overrun_is_504() {
        let manager = Arc::new(SessionManager::new(SessionConfig::default()));
        let transport: Arc<dyn ExecTransport> = Arc::new(InProcessTransport::new(manager));
        // The single code step sleeps past the request deadline.
        let mock = Arc::new(MockModel::script(vec![
            code_turn("m-root", "c1", "import time\ntime.sleep(0.5)"),
            text_turn("m-root", "too late"),
        ]));
        let controller = RecursionController::new(
            mock as Arc<dyn CompletionBackend>,
            transport,
            Arc::new(TracingSink),
            ControllerConfig::new("m-root", vec![], 1),
        );
        let coordinator = Arc::new(TaskCoordinator::new(controller, CoordinatorConfig::default()));
        let app = infer_router(InferServiceState {
            coordinator,
            request_deadline: Some(Duration::from_millis(100)),
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/infer")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"query": "stall"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn missing_query_is_400() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/infer")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"context": "no question here"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
