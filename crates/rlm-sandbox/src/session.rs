//! Per-session bookkeeping.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

use rlm_core::SessionId;

use crate::worker::SandboxHandle;

/// Observability snapshot of one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub execution_counter: u64,
}

pub(crate) struct SessionMeta {
    pub last_used_at: DateTime<Utc>,
    pub execution_counter: u64,
}

/// One live session. The `gate` serializes executions (FIFO on lock
/// acquisition); `meta` is touched only while an execution holds the gate
/// or by read-only snapshots.
pub(crate) struct SessionEntry {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub owner_tag: Option<String>,
    pub meta: Mutex<SessionMeta>,
    pub gate: AsyncMutex<()>,
    pub sandbox: SandboxHandle,
}

impl SessionEntry {
    pub fn new(id: SessionId, owner_tag: Option<String>, sandbox: SandboxHandle) -> Self {
        let now = Utc::now();
        SessionEntry {
            id,
            created_at: now,
            owner_tag,
            meta: Mutex::new(SessionMeta { last_used_at: now, execution_counter: 0 }),
            gate: AsyncMutex::new(()),
            sandbox,
        }
    }

    pub fn info(&self) -> SessionInfo {
        let meta = self.meta.lock().expect("session meta lock");
        SessionInfo {
            id: self.id.clone(),
            created_at: self.created_at,
            last_used_at: meta.last_used_at,
            execution_counter: meta.execution_counter,
        }
    }

    pub fn touch(&self) {
        let mut meta = self.meta.lock().expect("session meta lock");
        meta.last_used_at = Utc::now();
        meta.execution_counter += 1;
    }

    pub fn last_used_at(&self) -> DateTime<Utc> {
        self.meta.lock().expect("session meta lock").last_used_at
    }
}
