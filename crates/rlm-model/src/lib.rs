//! # RLM Model
//!
//! Typed wrapper over an external OpenAI-compatible chat-completion
//! endpoint: a message list and a tool set in, an assistant message and a
//! usage record out, with a uniform error taxonomy and a backoff helper
//! for the retryable kinds.

mod client;
mod retry;
mod tools;
mod wire;

pub use client::{ChatOptions, Completion, CompletionBackend, HttpModelClient};
pub use retry::{complete_with_retry, RetryPolicy};
pub use tools::ToolSpec;
