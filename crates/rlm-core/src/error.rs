//! Error taxonomy, one enum per surface.
//!
//! Transient faults (rate limits, connection drops) are recovered close to
//! where they occur; structural faults (bad credentials, malformed requests)
//! bubble upward. Failures the model should reason about never appear here
//! at all — they are encoded into [`crate::ExecOutputs`] and fed back as
//! tool-message content.

use thiserror::Error;

use crate::ids::SessionId;

/// Failures raised by the model provider boundary.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Provider asked us to slow down. Retryable with backoff.
    #[error("rate limited by model provider{}", retry_after_hint(.retry_after_ms))]
    RateLimited { retry_after_ms: Option<u64> },

    /// Connection-level or 5xx failure. Retryable with backoff.
    #[error("transient network failure talking to model provider: {0}")]
    TransientNetwork(String),

    /// The request itself was rejected. Fatal to the invocation.
    #[error("model provider rejected the request: {0}")]
    InvalidRequest(String),

    /// Credentials were refused. Fatal to the process.
    #[error("model provider authentication failed: {0}")]
    Authentication(String),

    /// The provider filtered the completion. The loop treats this as a
    /// signal to stop, not as a retryable fault.
    #[error("completion was filtered by the provider")]
    ContentFiltered,

    /// Retries exhausted without a usable completion.
    #[error("model unavailable after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl ModelError {
    /// Whether the caller may retry this call after backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModelError::RateLimited { .. } | ModelError::TransientNetwork(_))
    }
}

fn retry_after_hint(retry_after_ms: &Option<u64>) -> String {
    match retry_after_ms {
        Some(ms) => format!(" (retry after {ms}ms)"),
        None => String::new(),
    }
}

/// Failures raised by the session manager.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("capacity_exhausted: {live} live sessions at the configured maximum of {max}")]
    CapacityExhausted { live: usize, max: usize },

    #[error("no_such_session: {0}")]
    NoSuchSession(SessionId),

    /// Only produced by the non-blocking execute variant.
    #[error("busy: an execution is already in flight on session {0}")]
    Busy(SessionId),

    #[error("submitted code is {size} bytes, above the {max}-byte cap")]
    CodeTooLarge { size: usize, max: usize },

    /// The interpreter worker died or could not be started.
    #[error("sandbox failure: {0}")]
    Sandbox(String),
}

impl SessionError {
    /// Wire name used in HTTP error bodies.
    pub fn wire_name(&self) -> &'static str {
        match self {
            SessionError::CapacityExhausted { .. } => "capacity_exhausted",
            SessionError::NoSuchSession(_) => "no_such_session",
            SessionError::Busy(_) => "busy",
            SessionError::CodeTooLarge { .. } => "code_too_large",
            SessionError::Sandbox(_) => "sandbox_failure",
        }
    }
}

/// Failures raised by an execution transport binding.
///
/// These are the same across the in-process, loopback, and remote
/// bindings; the HTTP bindings reconstruct them from status codes and
/// error bodies.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The execution plane could not be reached, or answered too late.
    /// Executions are never retried on this — the server may already have
    /// observed the request.
    #[error("execution plane unavailable: {0}")]
    Unavailable(String),

    #[error("execution plane is at session capacity")]
    CapacityExhausted,

    #[error("session {0} does not exist on the execution plane")]
    NoSuchSession(SessionId),

    #[error("execution plane protocol error: {0}")]
    Protocol(String),
}

impl From<SessionError> for TransportError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::CapacityExhausted { .. } => TransportError::CapacityExhausted,
            SessionError::NoSuchSession(id) => TransportError::NoSuchSession(id),
            other => TransportError::Unavailable(other.to_string()),
        }
    }
}

/// Failures that terminate a reasoning invocation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Session creation failed, so the level could not start.
    #[error("could not open a sandbox session: {0}")]
    SessionUnavailable(#[source] TransportError),

    #[error("task was cancelled")]
    Cancelled,

    #[error("task exceeded its end-to-end deadline")]
    DeadlineExceeded,
}

/// Configuration parsing failures, naming the offending variable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limit_and_network_are_retryable() {
        assert!(ModelError::RateLimited { retry_after_ms: None }.is_retryable());
        assert!(ModelError::TransientNetwork("reset".into()).is_retryable());
        assert!(!ModelError::InvalidRequest("bad".into()).is_retryable());
        assert!(!ModelError::Authentication("401".into()).is_retryable());
        assert!(!ModelError::ContentFiltered.is_retryable());
    }

    #[test]
    fn session_errors_have_stable_wire_names() {
        let err = SessionError::CapacityExhausted { live: 64, max: 64 };
        assert_eq!(err.wire_name(), "capacity_exhausted");
        let err = SessionError::NoSuchSession(SessionId::from_string("x".into()));
        assert_eq!(err.wire_name(), "no_such_session");
    }
}
