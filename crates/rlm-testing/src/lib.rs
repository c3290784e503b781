//! # RLM Testing
//!
//! A scripted completion backend for deterministic loop tests: canned
//! turns are popped per call, and every call's inputs (model id, messages,
//! advertised tool names) are recorded for assertions.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use rlm_core::{ChatMessage, ModelError, ToolCall, UsageRecord};
use rlm_model::{ChatOptions, Completion, CompletionBackend, ToolSpec};

/// Inputs of one observed `complete` call.
#[derive(Debug, Clone)]
pub struct ObservedCall {
    pub model_id: String,
    pub messages: Vec<ChatMessage>,
    pub tool_names: Vec<String>,
}

/// A completion backend that replays a script.
///
/// Each `complete` call pops the next scripted turn. Running past the end
/// of the script yields `InvalidRequest` — a loop that calls more often
/// than its script allows is a broken test.
pub struct MockModel {
    script: Mutex<VecDeque<Completion>>,
    observed: Mutex<Vec<ObservedCall>>,
}

impl MockModel {
    pub fn script(turns: impl IntoIterator<Item = Completion>) -> Self {
        MockModel {
            script: Mutex::new(turns.into_iter().collect()),
            observed: Mutex::new(Vec::new()),
        }
    }

    /// All calls observed so far, in order.
    pub fn observed_calls(&self) -> Vec<ObservedCall> {
        self.observed.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.observed.lock().unwrap().len()
    }

    /// Tool names advertised on the call at `index`.
    pub fn tools_at(&self, index: usize) -> Vec<String> {
        self.observed.lock().unwrap()[index].tool_names.clone()
    }
}

#[async_trait]
impl CompletionBackend for MockModel {
    async fn complete(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        _options: &ChatOptions,
    ) -> Result<Completion, ModelError> {
        self.observed.lock().unwrap().push(ObservedCall {
            model_id: model_id.to_string(),
            messages: messages.to_vec(),
            tool_names: tools.iter().map(|t| t.name.to_string()).collect(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::InvalidRequest("mock model script exhausted".into()))
    }
}

/// A plain-text assistant turn (terminates a loop).
pub fn text_turn(model_id: &str, content: &str) -> Completion {
    Completion {
        message: ChatMessage::assistant(content),
        usage: unit_usage(model_id),
        content_filtered: false,
    }
}

/// An assistant turn carrying a single `code_execution` call.
pub fn code_turn(model_id: &str, call_id: &str, code: &str) -> Completion {
    tool_turn(model_id, vec![ToolCall::code_execution(call_id, code)])
}

/// An assistant turn carrying a single `ask_sub_rlm` call.
pub fn sub_turn(model_id: &str, call_id: &str, query: &str) -> Completion {
    tool_turn(model_id, vec![ToolCall::ask_sub_rlm(call_id, query)])
}

/// An assistant turn with arbitrary tool calls, in the given order.
pub fn tool_turn(model_id: &str, calls: Vec<ToolCall>) -> Completion {
    let mut message = ChatMessage::assistant("");
    message.tool_calls = calls;
    Completion {
        message,
        usage: unit_usage(model_id),
        content_filtered: false,
    }
}

/// A content-filtered turn: empty message, filtered flag set.
pub fn filtered_turn(model_id: &str) -> Completion {
    Completion {
        message: ChatMessage::assistant(""),
        usage: unit_usage(model_id),
        content_filtered: true,
    }
}

fn unit_usage(model_id: &str) -> UsageRecord {
    UsageRecord {
        prompt_tokens: 100,
        cached_prompt_tokens: 0,
        completion_tokens: 10,
        total_tokens: 110,
        wallclock_ms: 1,
        model_id: model_id.to_string(),
    }
}
