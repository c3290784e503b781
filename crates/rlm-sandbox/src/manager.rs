//! The session table and its operations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use rlm_core::config::SessionConfig;
use rlm_core::{ExecLimits, ExecOutputs, SessionError, SessionId};

use crate::session::{SessionEntry, SessionInfo};
use crate::worker::SandboxHandle;

/// Owner of all live sandbox sessions.
///
/// The table mutex is held only to look up, insert, or remove an entry;
/// executions run outside it, serialized per session by the entry's gate.
/// At capacity, `create_session` rejects rather than evicting a victim —
/// owners are never surprised by a disappearing session; idle ones are the
/// reaper's business.
pub struct SessionManager {
    config: SessionConfig,
    sessions: Mutex<HashMap<SessionId, Arc<SessionEntry>>>,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        SessionManager { config, sessions: Mutex::new(HashMap::new()) }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Allocate a fresh session with its own interpreter.
    pub fn create_session(&self, owner_tag: Option<String>) -> Result<SessionId, SessionError> {
        let id = SessionId::generate();
        let mut sessions = self.sessions.lock().expect("session table lock");
        if sessions.len() >= self.config.max_sessions {
            return Err(SessionError::CapacityExhausted {
                live: sessions.len(),
                max: self.config.max_sessions,
            });
        }
        let sandbox = SandboxHandle::spawn(&id)?;
        let entry = Arc::new(SessionEntry::new(id.clone(), owner_tag, sandbox));
        sessions.insert(id.clone(), entry);
        info!(session = %id, live = sessions.len(), "session created");
        Ok(id)
    }

    /// Execute code in a session, serialized behind the session gate.
    pub async fn execute(
        &self,
        id: &SessionId,
        code: &str,
        timeout_override_ms: Option<u64>,
    ) -> Result<ExecOutputs, SessionError> {
        let entry = self.lookup(id)?;
        let limits = self.limits_with_override(timeout_override_ms);
        if code.len() > limits.max_code_bytes {
            return Err(SessionError::CodeTooLarge { size: code.len(), max: limits.max_code_bytes });
        }

        let _serial = entry.gate.lock().await;
        let outputs = entry.sandbox.execute(code.to_string(), limits).await?;
        entry.touch();
        debug!(
            session = %id,
            duration_ms = outputs.duration_ms,
            error_kind = ?outputs.error_kind,
            "execution finished"
        );
        Ok(outputs)
    }

    /// Non-blocking variant: fails with `busy` instead of queueing behind
    /// an in-flight execution.
    pub async fn try_execute(
        &self,
        id: &SessionId,
        code: &str,
        timeout_override_ms: Option<u64>,
    ) -> Result<ExecOutputs, SessionError> {
        let entry = self.lookup(id)?;
        let limits = self.limits_with_override(timeout_override_ms);
        if code.len() > limits.max_code_bytes {
            return Err(SessionError::CodeTooLarge { size: code.len(), max: limits.max_code_bytes });
        }

        let Ok(_serial) = entry.gate.try_lock() else {
            return Err(SessionError::Busy(id.clone()));
        };
        let outputs = entry.sandbox.execute(code.to_string(), limits).await?;
        entry.touch();
        Ok(outputs)
    }

    /// Destroy a session. Idempotent: unknown ids are fine. Waits for any
    /// in-flight execution before tearing down the interpreter.
    pub async fn destroy_session(&self, id: &SessionId) {
        let entry = {
            let mut sessions = self.sessions.lock().expect("session table lock");
            sessions.remove(id)
        };
        if let Some(entry) = entry {
            let _serial = entry.gate.lock().await;
            entry.sandbox.shutdown().await;
            info!(session = %id, "session destroyed");
        }
    }

    /// Snapshot of all live sessions, for observability only.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.lock().expect("session table lock");
        sessions.values().map(|entry| entry.info()).collect()
    }

    pub fn live_count(&self) -> usize {
        self.sessions.lock().expect("session table lock").len()
    }

    pub(crate) fn lookup(&self, id: &SessionId) -> Result<Arc<SessionEntry>, SessionError> {
        let sessions = self.sessions.lock().expect("session table lock");
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NoSuchSession(id.clone()))
    }

    /// Ids of sessions past their idle or absolute TTL.
    pub(crate) fn expired_ids(&self) -> Vec<SessionId> {
        let idle_ttl = chrono::Duration::from_std(self.config.idle_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(600));
        let absolute_ttl = chrono::Duration::from_std(self.config.absolute_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(3600));
        let now = chrono::Utc::now();

        let sessions = self.sessions.lock().expect("session table lock");
        sessions
            .values()
            .filter(|entry| {
                now - entry.last_used_at() > idle_ttl || now - entry.created_at > absolute_ttl
            })
            .map(|entry| entry.id.clone())
            .collect()
    }

    fn limits_with_override(&self, timeout_override_ms: Option<u64>) -> ExecLimits {
        match timeout_override_ms {
            Some(ms) => self.config.default_limits.with_wall_timeout_ms(ms),
            None => self.config.default_limits,
        }
    }
}
