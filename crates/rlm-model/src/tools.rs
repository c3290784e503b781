//! JSON-schema declarations for the advertised tools.

use serde_json::{json, Value};

use rlm_core::message::{ASK_SUB_RLM_TOOL, CODE_EXECUTION_TOOL};

/// A tool declaration in the shape the chat wire expects.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

impl ToolSpec {
    /// The stateful code execution tool. Advertised whenever the level has
    /// a sandbox session.
    pub fn code_execution() -> Self {
        ToolSpec {
            name: CODE_EXECUTION_TOOL,
            description: "Execute Python code in a persistent sandboxed interpreter. \
                          Variables and imports survive between calls within this conversation. \
                          Returns captured stdout, stderr, and an error kind on failure.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "Python source to execute."
                    }
                },
                "required": ["code"]
            }),
        }
    }

    /// The sub-reasoner tool. Advertised only while depth budget remains.
    pub fn ask_sub_rlm() -> Self {
        ToolSpec {
            name: ASK_SUB_RLM_TOOL,
            description: "Delegate a narrower sub-question to a fresh reasoner with its own \
                          sandbox. Returns the sub-reasoner's final answer as text.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The sub-question to answer."
                    }
                },
                "required": ["query"]
            }),
        }
    }
}
