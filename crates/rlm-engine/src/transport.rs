//! The polymorphic boundary between the reasoning loop and the session
//! manager.
//!
//! Three bindings share one contract: direct in-process calls, loopback
//! HTTP to a sidecar, and remote HTTP to a cluster service. The HTTP
//! bindings are the same type pointed at different base URLs. Everything
//! above this module is written against [`ExecTransport`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use rlm_core::{ExecOutputs, SessionId, TransportError};
use rlm_sandbox::SessionManager;

/// Operations a reasoning level may perform against the execution plane.
#[async_trait]
pub trait ExecTransport: Send + Sync {
    async fn create_session(&self, owner_tag: Option<String>) -> Result<SessionId, TransportError>;

    /// Run one code string. This is never retried by the transport: once
    /// the server may have observed the request, a replay could repeat
    /// non-idempotent effects on session state.
    async fn execute(
        &self,
        session: &SessionId,
        code: &str,
        timeout_override_ms: Option<u64>,
    ) -> Result<ExecOutputs, TransportError>;

    async fn destroy_session(&self, session: &SessionId) -> Result<(), TransportError>;

    async fn health(&self) -> Result<(), TransportError>;
}

/// Direct calls into an in-process session manager. Zero serialization;
/// the local-development binding.
pub struct InProcessTransport {
    manager: Arc<SessionManager>,
}

impl InProcessTransport {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        InProcessTransport { manager }
    }
}

#[async_trait]
impl ExecTransport for InProcessTransport {
    async fn create_session(&self, owner_tag: Option<String>) -> Result<SessionId, TransportError> {
        Ok(self.manager.create_session(owner_tag)?)
    }

    async fn execute(
        &self,
        session: &SessionId,
        code: &str,
        timeout_override_ms: Option<u64>,
    ) -> Result<ExecOutputs, TransportError> {
        Ok(self.manager.execute(session, code, timeout_override_ms).await?)
    }

    async fn destroy_session(&self, session: &SessionId) -> Result<(), TransportError> {
        self.manager.destroy_session(session).await;
        Ok(())
    }

    async fn health(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// HTTP binding to the execution service. Used for both the loopback
/// (same-pod sidecar) and remote (cross-pod) topologies.
pub struct HttpExecTransport {
    http: reqwest::Client,
    base_url: String,
    /// Added on top of the execute wall timeout for every request.
    network_budget: Duration,
    default_wall_timeout: Duration,
}

#[derive(Deserialize)]
struct SessionCreated {
    session_id: String,
}

#[derive(Deserialize)]
struct WireError {
    #[serde(default)]
    error: String,
}

impl HttpExecTransport {
    pub fn new(
        base_url: impl Into<String>,
        network_budget: Duration,
        default_wall_timeout: Duration,
    ) -> Result<Self, TransportError> {
        // Pooled keep-alive client; per-request timeouts are set per call.
        let http = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| TransportError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(HttpExecTransport { http, base_url, network_budget, default_wall_timeout })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn wire_error_name(response: reqwest::Response) -> String {
        response
            .json::<WireError>()
            .await
            .map(|body| body.error)
            .unwrap_or_default()
    }
}

#[async_trait]
impl ExecTransport for HttpExecTransport {
    async fn create_session(&self, owner_tag: Option<String>) -> Result<SessionId, TransportError> {
        let body = match owner_tag {
            Some(tag) => serde_json::json!({ "owner_tag": tag }),
            None => serde_json::json!({}),
        };
        let response = self
            .http
            .post(self.url("/session"))
            .timeout(self.network_budget)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        match response.status().as_u16() {
            200 => {
                let created: SessionCreated = response
                    .json()
                    .await
                    .map_err(|e| TransportError::Protocol(e.to_string()))?;
                debug!(session = %created.session_id, "created remote session");
                Ok(SessionId::from_string(created.session_id))
            }
            503 => Err(TransportError::CapacityExhausted),
            status => Err(TransportError::Protocol(format!(
                "unexpected status {status} creating session: {}",
                Self::wire_error_name(response).await
            ))),
        }
    }

    async fn execute(
        &self,
        session: &SessionId,
        code: &str,
        timeout_override_ms: Option<u64>,
    ) -> Result<ExecOutputs, TransportError> {
        let wall = timeout_override_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_wall_timeout);
        let body = match timeout_override_ms {
            Some(ms) => serde_json::json!({ "code": code, "timeout_ms": ms }),
            None => serde_json::json!({ "code": code }),
        };
        let response = self
            .http
            .post(self.url(&format!("/session/{session}/execute")))
            .timeout(wall + self.network_budget)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        match response.status().as_u16() {
            200 => response
                .json::<ExecOutputs>()
                .await
                .map_err(|e| TransportError::Protocol(e.to_string())),
            404 => Err(TransportError::NoSuchSession(session.clone())),
            status => Err(TransportError::Protocol(format!(
                "unexpected status {status} executing: {}",
                Self::wire_error_name(response).await
            ))),
        }
    }

    async fn destroy_session(&self, session: &SessionId) -> Result<(), TransportError> {
        let response = self
            .http
            .delete(self.url(&format!("/session/{session}")))
            .timeout(self.network_budget)
            .send()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        // 204 for live and unknown sessions alike; destroy is idempotent.
        match response.status().as_u16() {
            204 => Ok(()),
            status => Err(TransportError::Protocol(format!("unexpected status {status} destroying session"))),
        }
    }

    async fn health(&self) -> Result<(), TransportError> {
        let response = self
            .http
            .get(self.url("/health"))
            .timeout(self.network_budget)
            .send()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::Unavailable(format!(
                "health endpoint returned {}",
                response.status()
            )))
        }
    }
}
