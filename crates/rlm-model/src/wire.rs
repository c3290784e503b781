//! Request/response shapes of the OpenAI-compatible chat wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use rlm_core::{ChatMessage, Role, ToolCall};

use crate::tools::ToolSpec;

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireMessage {
    pub role: &'static str,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCallOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireToolCallOut {
    pub id: String,
    pub r#type: &'static str,
    pub function: WireFunctionOut,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireFunctionOut {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireTool {
    pub r#type: &'static str,
    pub function: WireToolFunction,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireToolFunction {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

impl From<&ToolSpec> for WireTool {
    fn from(spec: &ToolSpec) -> Self {
        WireTool {
            r#type: "function",
            function: WireToolFunction {
                name: spec.name,
                description: spec.description,
                parameters: spec.parameters.clone(),
            },
        }
    }
}

pub(crate) fn to_wire_message(message: &ChatMessage) -> WireMessage {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let tool_calls = message
        .tool_calls
        .iter()
        .map(|call| WireToolCallOut {
            id: call.id.clone(),
            r#type: "function",
            function: WireFunctionOut {
                name: call.tool_name().to_string(),
                arguments: arguments_json(call),
            },
        })
        .collect();
    WireMessage {
        role,
        content: message.content.clone(),
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn arguments_json(call: &ToolCall) -> String {
    use rlm_core::ToolInvocation;
    let value = match &call.invocation {
        ToolInvocation::CodeExecution { code } => serde_json::json!({ "code": code }),
        ToolInvocation::AskSubRlm { query } => serde_json::json!({ "query": query }),
        ToolInvocation::Unknown { .. } => serde_json::json!({}),
    };
    value.to_string()
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    pub choices: Vec<WireChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireChoice {
    pub message: WireAssistantMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireAssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<WireToolCallIn>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireToolCallIn {
    pub id: String,
    pub function: WireFunctionIn,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireFunctionIn {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub prompt_tokens_details: Option<WirePromptDetails>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WirePromptDetails {
    #[serde(default)]
    pub cached_tokens: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireErrorBody {
    #[serde(default)]
    pub error: Option<WireErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireErrorDetail {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlm_core::ChatMessage;

    #[test]
    fn assistant_tool_calls_round_trip_to_wire_shape() {
        let mut msg = ChatMessage::assistant("");
        msg.tool_calls.push(ToolCall::code_execution("c1", "print(1)"));
        let wire = to_wire_message(&msg);
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["tool_calls"][0]["function"]["name"], "code_execution");
        assert_eq!(
            json["tool_calls"][0]["function"]["arguments"],
            "{\"code\":\"print(1)\"}"
        );
    }

    #[test]
    fn response_parses_tool_calls_and_cached_usage() {
        let body = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "ask_sub_rlm", "arguments": "{\"query\":\"3+4\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {
                "prompt_tokens": 120,
                "completion_tokens": 8,
                "total_tokens": 128,
                "prompt_tokens_details": {"cached_tokens": 100}
            }
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        let choice = &parsed.choices[0];
        assert_eq!(choice.message.tool_calls[0].function.name, "ask_sub_rlm");
        assert_eq!(parsed.usage.as_ref().unwrap().prompt_tokens_details.as_ref().unwrap().cached_tokens, 100);
    }
}
