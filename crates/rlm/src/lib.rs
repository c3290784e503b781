//! # RLM
//!
//! A recursive language model runtime: a reasoning orchestrator that
//! drives chat models through tool-using conversations against stateful
//! sandboxed interpreter sessions, and lets a model delegate narrower
//! sub-questions to child reasoners with their own sessions, down to a
//! strict depth bound.
//!
//! This facade re-exports the public API of the member crates:
//!
//! - [`rlm_core`]: messages, tool calls, outputs, limits, configuration
//! - [`rlm_sandbox`]: the execution plane (sessions, interpreter, reaper)
//! - [`rlm_model`]: the chat-completion client
//! - [`rlm_engine`]: transports, REPL environment, reasoning loop,
//!   recursion controller, task coordinator
//! - [`rlm_http`]: the execution and inference HTTP services

pub use rlm_core::{
    ChatMessage, ExecErrorKind, ExecLimits, ExecOutputs, LevelContext, RecursionId, RlmConfig,
    Role, SessionId, ToolCall, ToolInvocation, TransportKind, UsageRecord,
};
pub use rlm_engine::{
    ControllerConfig, ExecTransport, HttpExecTransport, InProcessTransport, RecursionController,
    ReplEnv, Task, TaskCoordinator, TaskHandle, TaskOptions, TaskResult, TelemetrySink,
};
pub use rlm_http::{exec_router, infer_router, ExecServiceState, InferServiceState};
pub use rlm_model::{ChatOptions, CompletionBackend, HttpModelClient};
pub use rlm_sandbox::{spawn_reaper, SessionManager};
