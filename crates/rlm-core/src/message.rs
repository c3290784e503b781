//! Conversation messages and tool calls.
//!
//! The message shape follows the OpenAI-compatible chat wire: assistant
//! messages may carry tool calls, and tool messages answer a prior call by
//! id. Tool invocations are a closed enum — the loop dispatches on the
//! variant, not on a string lookup — with an `Unknown` variant preserving
//! names the runtime does not recognize so the loop can answer them with an
//! `unknown_tool` observation instead of failing.

use serde::{Deserialize, Serialize};

/// Name of the code execution tool as advertised to the model.
pub const CODE_EXECUTION_TOOL: &str = "code_execution";
/// Name of the sub-reasoner tool as advertised to the model.
pub const ASK_SUB_RLM_TOOL: &str = "ask_sub_rlm";

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Tool invocations requested by an assistant message, in emitted order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For `Role::Tool` messages: the id of the call being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// A tool observation answering the call with the given id.
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A structured request embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub invocation: ToolInvocation,
}

impl ToolCall {
    /// Parse a wire-level (name, JSON arguments) pair. Unrecognized names
    /// and malformed argument payloads both land in `Unknown` so the caller
    /// can report them back to the model.
    pub fn from_wire(id: String, name: &str, arguments: &str) -> Self {
        let invocation = match name {
            CODE_EXECUTION_TOOL => match serde_json::from_str::<CodeArgs>(arguments) {
                Ok(args) => ToolInvocation::CodeExecution { code: args.code },
                Err(_) => ToolInvocation::Unknown { name: name.to_string() },
            },
            ASK_SUB_RLM_TOOL => match serde_json::from_str::<QueryArgs>(arguments) {
                Ok(args) => ToolInvocation::AskSubRlm { query: args.query },
                Err(_) => ToolInvocation::Unknown { name: name.to_string() },
            },
            other => ToolInvocation::Unknown { name: other.to_string() },
        };
        ToolCall { id, invocation }
    }

    pub fn code_execution(id: impl Into<String>, code: impl Into<String>) -> Self {
        ToolCall {
            id: id.into(),
            invocation: ToolInvocation::CodeExecution { code: code.into() },
        }
    }

    pub fn ask_sub_rlm(id: impl Into<String>, query: impl Into<String>) -> Self {
        ToolCall {
            id: id.into(),
            invocation: ToolInvocation::AskSubRlm { query: query.into() },
        }
    }

    /// The wire name of the invoked tool.
    pub fn tool_name(&self) -> &str {
        match &self.invocation {
            ToolInvocation::CodeExecution { .. } => CODE_EXECUTION_TOOL,
            ToolInvocation::AskSubRlm { .. } => ASK_SUB_RLM_TOOL,
            ToolInvocation::Unknown { name } => name,
        }
    }
}

/// The closed set of tools the runtime understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolInvocation {
    CodeExecution { code: String },
    AskSubRlm { query: String },
    Unknown { name: String },
}

#[derive(Deserialize)]
struct CodeArgs {
    code: String,
}

#[derive(Deserialize)]
struct QueryArgs {
    query: String,
}
