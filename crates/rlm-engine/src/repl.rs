//! The REPL environment a reasoning level works through.
//!
//! Binds one sandbox session (via a transport) and, while depth budget
//! remains, a sub-reasoner factory. `run_code` never errors — transport
//! failures are folded into the outputs so the model can observe them —
//! and `close` is idempotent and required on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use rlm_core::{EngineError, ExecOutputs, SessionId, TransportError};

use crate::transport::ExecTransport;

/// A factory-bound child reasoner. Invoking it runs a complete child level
/// (own session, own conversation) and returns its final answer text.
#[async_trait]
pub trait SubReasoner: Send + Sync {
    async fn run(&self, query: String) -> Result<String, EngineError>;
}

pub struct ReplEnv {
    transport: Arc<dyn ExecTransport>,
    session: SessionId,
    sub: Option<Arc<dyn SubReasoner>>,
    wall_timeout_override_ms: Option<u64>,
    closed: AtomicBool,
}

impl ReplEnv {
    /// Create the session up front and fail fast if the execution plane is
    /// unavailable. A capacity rejection gets one retry after a second; any
    /// further failure surfaces as `SessionUnavailable`.
    pub async fn open(
        transport: Arc<dyn ExecTransport>,
        sub: Option<Arc<dyn SubReasoner>>,
        owner_tag: Option<String>,
        wall_timeout_override_ms: Option<u64>,
    ) -> Result<Self, EngineError> {
        let session = match transport.create_session(owner_tag.clone()).await {
            Ok(session) => session,
            Err(TransportError::CapacityExhausted) => {
                tokio::time::sleep(Duration::from_secs(1)).await;
                transport
                    .create_session(owner_tag)
                    .await
                    .map_err(EngineError::SessionUnavailable)?
            }
            Err(err) => return Err(EngineError::SessionUnavailable(err)),
        };
        Ok(ReplEnv {
            transport,
            session,
            sub,
            wall_timeout_override_ms,
            closed: AtomicBool::new(false),
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session
    }

    pub fn has_sub(&self) -> bool {
        self.sub.is_some()
    }

    /// Execute code in the bound session. Failures of the transport itself
    /// become outputs with `transport_unavailable` so the caller can report
    /// them to the model; the execution is not retried.
    pub async fn run_code(&self, code: &str) -> ExecOutputs {
        match self
            .transport
            .execute(&self.session, code, self.wall_timeout_override_ms)
            .await
        {
            Ok(outputs) => outputs,
            Err(err) => {
                warn!(session = %self.session, error = %err, "code execution failed in transport");
                ExecOutputs::transport_failure(err.to_string())
            }
        }
    }

    /// Load the task context into the session as the `context` variable.
    /// JSON-encoded context arrives as the parsed Python value; anything
    /// else is bound as a plain string. The text travels as a JSON string
    /// literal, which is also a valid Python string literal.
    pub async fn seed_context(&self, context_text: &str) -> ExecOutputs {
        let literal = serde_json::to_string(context_text)
            .unwrap_or_else(|_| "\"\"".to_string());
        let code = if serde_json::from_str::<serde_json::Value>(context_text).is_ok() {
            format!("import json\ncontext = json.loads({literal})")
        } else {
            format!("context = {literal}")
        };
        self.run_code(&code).await
    }

    /// Run a child reasoner. Only meaningful while depth budget remains;
    /// callers gate on [`ReplEnv::has_sub`] — the loop treats a stray
    /// `ask_sub_rlm` call on a sub-less level as an unknown tool instead.
    pub async fn ask_sub(&self, query: &str) -> Result<String, EngineError> {
        match &self.sub {
            Some(sub) => sub.run(query.to_string()).await,
            None => Err(EngineError::SessionUnavailable(TransportError::Protocol(
                "ask_sub on a level without a sub-reasoner".into(),
            ))),
        }
    }

    /// Destroy the bound session. Idempotent; errors are logged, not
    /// surfaced — the reaper covers a failed remote destroy.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = self.transport.destroy_session(&self.session).await {
            warn!(session = %self.session, error = %err, "failed to destroy session on close");
        }
    }
}

impl Drop for ReplEnv {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            // Can't await in drop; the reaper will collect the session.
            warn!(session = %self.session, "REPL environment dropped without close()");
        }
    }
}
