//! Telemetry event shape and the default tracing-backed sink.
//!
//! Persistence is a collaborator's job; this module only fixes the record
//! every sink must accept. Each event carries the full recursion lineage
//! so a time-series consumer can rebuild the tree per request.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use rlm_core::{ExecErrorKind, RecursionId, UsageRecord};

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    pub timestamp: DateTime<Utc>,
    pub recursion_id: RecursionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_recursion_id: Option<RecursionId>,
    pub depth: u32,
    pub model_id: String,
    #[serde(flatten)]
    pub kind: TelemetryEventKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEventKind {
    LevelStarted { query_chars: usize },
    ModelCall { usage: UsageRecord },
    CodeExecuted {
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_kind: Option<ExecErrorKind>,
    },
    SubCall { child_recursion_id: RecursionId },
    LevelFinished { iterations: u32, answer_chars: usize },
}

/// Consumer of telemetry events. Implementations must be cheap and
/// non-blocking; they are called inline from the reasoning loop.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: &TelemetryEvent);
}

/// Default sink: structured tracing events, one per telemetry record.
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&self, event: &TelemetryEvent) {
        info!(
            recursion_id = %event.recursion_id,
            parent = event.parent_recursion_id.as_ref().map(|id| id.as_str()),
            depth = event.depth,
            model = %event.model_id,
            kind = ?event.kind,
            "rlm_event"
        );
    }
}

/// Sink that stores events in memory, for tests.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().expect("telemetry sink lock").clone()
    }
}

impl TelemetrySink for RecordingSink {
    fn record(&self, event: &TelemetryEvent) {
        self.events.lock().expect("telemetry sink lock").push(event.clone());
    }
}
