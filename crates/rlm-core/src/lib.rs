//! # RLM Core
//!
//! Shared types for the recursive language model runtime. This crate defines
//! the conversation data model (messages and tool calls), execution outputs,
//! token usage accounting, opaque identifiers, per-level recursion context,
//! resource limits, the error taxonomy, and environment configuration.
//!
//! Everything here is wire-visible or crosses a crate boundary; the moving
//! parts (sandbox, model client, reasoning engine, HTTP surfaces) live in
//! their own crates and depend on this one.

pub mod config;
pub mod error;
pub mod ids;
pub mod level;
pub mod limits;
pub mod message;
pub mod outputs;
pub mod usage;

pub use config::{CoordinatorConfig, ModelConfig, RlmConfig, SessionConfig, TransportKind};
pub use error::{ConfigError, EngineError, ModelError, SessionError, TransportError};
pub use ids::{RecursionId, SessionId};
pub use level::LevelContext;
pub use limits::ExecLimits;
pub use message::{ChatMessage, Role, ToolCall, ToolInvocation};
pub use outputs::{ExecErrorKind, ExecOutputs};
pub use usage::UsageRecord;
