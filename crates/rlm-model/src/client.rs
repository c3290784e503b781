//! The completion backend trait and its HTTP implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use rlm_core::{ChatMessage, ModelError, Role, ToolCall, UsageRecord};

use crate::tools::ToolSpec;
use crate::wire::{
    to_wire_message, ChatCompletionRequest, ChatCompletionResponse, WireErrorBody, WireTool,
};

/// Sampling options for one completion. All fields optional; provider
/// defaults apply when unset.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
}

/// One completed model turn.
#[derive(Debug, Clone)]
pub struct Completion {
    pub message: ChatMessage,
    pub usage: UsageRecord,
    /// Set when the provider filtered the completion; the message content
    /// is empty and the caller should stop the conversation.
    pub content_filtered: bool,
}

/// The seam between the reasoning loop and the model provider. The HTTP
/// client implements it for production; tests substitute a scripted mock.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        options: &ChatOptions,
    ) -> Result<Completion, ModelError>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
///
/// Holds one pooled `reqwest::Client`; concurrent calls are safe and share
/// keep-alive connections. Construct once per process.
pub struct HttpModelClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpModelClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::TransientNetwork(format!("failed to build HTTP client: {e}")))?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(HttpModelClient { http, base_url, api_key: api_key.into() })
    }
}

#[async_trait]
impl CompletionBackend for HttpModelClient {
    async fn complete(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        options: &ChatOptions,
    ) -> Result<Completion, ModelError> {
        let request = ChatCompletionRequest {
            model: model_id.to_string(),
            messages: messages.iter().map(to_wire_message).collect(),
            tools: tools.iter().map(WireTool::from).collect(),
            temperature: options.temperature,
            max_completion_tokens: options.max_output_tokens,
            stop: options.stop.clone(),
        };

        let started = Instant::now();
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = retry_after_ms(&response);
            let detail = error_detail(response).await;
            return Err(classify_status(status, retry_after_ms, detail));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ModelError::TransientNetwork(format!("malformed completion body: {e}")))?;
        let wallclock_ms = started.elapsed().as_millis() as u64;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidRequest("completion carried no choices".into()))?;

        let content_filtered = choice.finish_reason.as_deref() == Some("content_filter");
        if content_filtered {
            warn!(model = model_id, "completion was content-filtered");
        }

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .iter()
            .map(|call| ToolCall::from_wire(call.id.clone(), &call.function.name, &call.function.arguments))
            .collect();

        let mut usage = UsageRecord::new(model_id);
        if let Some(wire) = body.usage {
            usage.prompt_tokens = wire.prompt_tokens;
            usage.completion_tokens = wire.completion_tokens;
            usage.total_tokens = wire.total_tokens;
            usage.cached_prompt_tokens = wire
                .prompt_tokens_details
                .map(|d| d.cached_tokens)
                .unwrap_or(0);
        }
        usage.wallclock_ms = wallclock_ms;

        debug!(
            model = model_id,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            tool_calls = tool_calls.len(),
            "completion finished"
        );

        let message = ChatMessage {
            role: Role::Assistant,
            content: if content_filtered {
                String::new()
            } else {
                choice.message.content.unwrap_or_default()
            },
            tool_calls,
            tool_call_id: None,
        };

        Ok(Completion { message, usage, content_filtered })
    }
}

fn classify_send_error(err: reqwest::Error) -> ModelError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ModelError::TransientNetwork(err.to_string())
    } else {
        ModelError::TransientNetwork(format!("transport failure: {err}"))
    }
}

fn retry_after_ms(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| secs * 1000)
}

async fn error_detail(response: reqwest::Response) -> String {
    match response.json::<WireErrorBody>().await {
        Ok(body) => body.error.map(|e| e.message).unwrap_or_default(),
        Err(_) => String::new(),
    }
}

fn classify_status(status: StatusCode, retry_after_ms: Option<u64>, detail: String) -> ModelError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ModelError::RateLimited { retry_after_ms },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ModelError::Authentication(detail),
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
            ModelError::InvalidRequest(detail)
        }
        status if status.is_server_error() => {
            ModelError::TransientNetwork(format!("provider returned {status}: {detail}"))
        }
        status => ModelError::InvalidRequest(format!("unexpected status {status}: {detail}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_matches_the_taxonomy() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, Some(2000), String::new()),
            ModelError::RateLimited { retry_after_ms: Some(2000) }
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, None, String::new()),
            ModelError::Authentication(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, None, String::new()),
            ModelError::InvalidRequest(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, None, String::new()),
            ModelError::TransientNetwork(_)
        ));
    }
}
