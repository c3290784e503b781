//! Backoff for the retryable model error kinds.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use rlm_core::{ChatMessage, ModelError};

use crate::client::{ChatOptions, Completion, CompletionBackend};
use crate::tools::ToolSpec;

/// Exponential backoff with full jitter, bounded by attempts and by a
/// total sleep budget.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub total_budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            total_budget: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Full-jitter delay for the given zero-based attempt: uniform in
    /// `[0, base * 2^attempt]`, clamped to the remaining budget.
    fn delay_for(&self, attempt: u32, spent: Duration) -> Duration {
        let ceiling = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let remaining = self.total_budget.saturating_sub(spent);
        let cap = ceiling.min(remaining);
        if cap.is_zero() {
            return Duration::ZERO;
        }
        let jittered = rand::rng().random_range(0..=cap.as_millis() as u64);
        Duration::from_millis(jittered)
    }
}

/// Call the backend, retrying `rate_limited` and `transient_network`
/// failures. Every other error kind is returned on the first occurrence;
/// exhausted retries surface as [`ModelError::Exhausted`].
pub async fn complete_with_retry(
    backend: &dyn CompletionBackend,
    model_id: &str,
    messages: &[ChatMessage],
    tools: &[ToolSpec],
    options: &ChatOptions,
    policy: RetryPolicy,
) -> Result<Completion, ModelError> {
    let mut spent = Duration::ZERO;
    let mut last_error = String::new();

    for attempt in 0..policy.max_attempts {
        match backend.complete(model_id, messages, tools, options).await {
            Ok(completion) => return Ok(completion),
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = match &err {
                    ModelError::RateLimited { retry_after_ms: Some(ms) } => {
                        Duration::from_millis(*ms).min(policy.total_budget.saturating_sub(spent))
                    }
                    _ => policy.delay_for(attempt, spent),
                };
                warn!(
                    model = model_id,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying model call"
                );
                last_error = err.to_string();
                tokio::time::sleep(delay).await;
                spent += delay;
            }
            Err(err) if err.is_retryable() => {
                return Err(ModelError::Exhausted {
                    attempts: policy.max_attempts,
                    last: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }

    Err(ModelError::Exhausted { attempts: policy.max_attempts, last: last_error })
}
