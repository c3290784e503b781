//! The result record of one code execution, and its model-visible rendering.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Failure classification for a single execution.
///
/// The first five kinds are produced by the sandbox runtime. The last two
/// are attached by the reasoning layer: `TransportUnavailable` when the
/// execution plane could not be reached at all, `SubFailed` when a
/// sub-reasoner invocation failed. All of them are reported to the model as
/// tool-message content rather than terminating the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecErrorKind {
    Syntax,
    Runtime,
    Timeout,
    Memory,
    OutputOverflow,
    TransportUnavailable,
    SubFailed,
}

impl ExecErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecErrorKind::Syntax => "syntax",
            ExecErrorKind::Runtime => "runtime",
            ExecErrorKind::Timeout => "timeout",
            ExecErrorKind::Memory => "memory",
            ExecErrorKind::OutputOverflow => "output_overflow",
            ExecErrorKind::TransportUnavailable => "transport_unavailable",
            ExecErrorKind::SubFailed => "sub_failed",
        }
    }
}

impl fmt::Display for ExecErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Captured outputs of one code execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecOutputs {
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ExecErrorKind>,
}

impl ExecOutputs {
    /// An execution that never reached the sandbox.
    pub fn transport_failure(detail: impl Into<String>) -> Self {
        ExecOutputs {
            stdout: String::new(),
            stderr: detail.into(),
            duration_ms: 0,
            error_kind: Some(ExecErrorKind::TransportUnavailable),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_kind.is_none()
    }

    /// Render the tagged textual block fed back to the model as a tool
    /// message. Section order is fixed (stdout, stderr, error) and empty
    /// sections are omitted; prompt tuning depends on this exact shape.
    pub fn to_tool_text(&self) -> String {
        let mut sections = Vec::with_capacity(3);
        sections.push(format!("<stdout>{}</stdout>", self.stdout));
        if !self.stderr.is_empty() {
            sections.push(format!("<stderr>{}</stderr>", self.stderr));
        }
        if let Some(kind) = self.error_kind {
            sections.push(format!("<error>{kind}</error>"));
        }
        sections.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_stdout_only_on_success() {
        let out = ExecOutputs {
            stdout: "42\n".into(),
            stderr: String::new(),
            duration_ms: 3,
            error_kind: None,
        };
        assert_eq!(out.to_tool_text(), "<stdout>42\n</stdout>");
    }

    #[test]
    fn renders_all_sections_in_order() {
        let out = ExecOutputs {
            stdout: "partial".into(),
            stderr: "Traceback: NameError".into(),
            duration_ms: 5,
            error_kind: Some(ExecErrorKind::Runtime),
        };
        assert_eq!(
            out.to_tool_text(),
            "<stdout>partial</stdout>\n<stderr>Traceback: NameError</stderr>\n<error>runtime</error>"
        );
    }

    #[test]
    fn error_kind_wire_names_are_snake_case() {
        let json = serde_json::to_string(&ExecErrorKind::OutputOverflow).unwrap();
        assert_eq!(json, "\"output_overflow\"");
    }
}
