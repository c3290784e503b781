//! # RLM Engine
//!
//! The reasoning side of the runtime: the transport boundary to the
//! execution plane, the REPL environment a level reasons through, the
//! per-level conversation loop, the recursion controller that wires levels
//! into a bounded tree, and the task coordinator multiplexing concurrent
//! requests over a worker pool.

pub mod controller;
pub mod coordinator;
pub mod prompts;
pub mod reasoning;
pub mod repl;
pub mod telemetry;
pub mod transport;

pub use controller::{ControllerConfig, RecursionController, TreeOutcome};
pub use coordinator::{Task, TaskCoordinator, TaskError, TaskHandle, TaskOptions, TaskResult};
pub use reasoning::{LevelOutcome, ReasoningLoop};
pub use repl::{ReplEnv, SubReasoner};
pub use telemetry::{RecordingSink, TelemetryEvent, TelemetryEventKind, TelemetrySink, TracingSink};
pub use transport::{ExecTransport, HttpExecTransport, InProcessTransport};
