//! The per-level conversation engine.
//!
//! One `ReasoningLoop` drives one model through a tool-using conversation
//! until it produces an assistant message with no tool calls, or the
//! iteration cap forces a final tool-less synthesis turn. Tool calls are
//! dispatched strictly in the order the model emitted them — parallel
//! dispatch would break per-session serialization and make observation
//! order in the transcript nondeterministic.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use rlm_core::{
    ChatMessage, EngineError, ExecErrorKind, ExecOutputs, LevelContext, ToolInvocation, UsageRecord,
};
use rlm_model::{ChatOptions, CompletionBackend, RetryPolicy, ToolSpec, complete_with_retry};

use crate::prompts::{system_prompt, FINALIZE_NUDGE};
use crate::repl::ReplEnv;
use crate::telemetry::{TelemetryEvent, TelemetryEventKind, TelemetrySink};

/// Tool-message content for a call the level does not recognize. This is
/// also the answer to `ask_sub_rlm` on a level whose depth budget is
/// spent: the call is treated exactly like a tool that does not exist.
const UNKNOWN_TOOL_TEXT: &str = "<error>unknown_tool</error>";

/// What one finished level returns to its caller.
#[derive(Debug)]
pub struct LevelOutcome {
    pub answer: String,
    /// One record per model call, in order.
    pub usage: Vec<UsageRecord>,
    pub iterations: u32,
}

pub struct ReasoningLoop {
    backend: Arc<dyn CompletionBackend>,
    ctx: LevelContext,
    repl: ReplEnv,
    cancel: CancellationToken,
    telemetry: Arc<dyn TelemetrySink>,
    options: ChatOptions,
    retry: RetryPolicy,
}

impl ReasoningLoop {
    /// A level with a REPL environment. The tool set follows the
    /// environment: `code_execution` always, `ask_sub_rlm` only when a
    /// sub-reasoner is bound.
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        ctx: LevelContext,
        repl: ReplEnv,
        cancel: CancellationToken,
        telemetry: Arc<dyn TelemetrySink>,
        options: ChatOptions,
        retry: RetryPolicy,
    ) -> Self {
        ReasoningLoop { backend, ctx, repl, cancel, telemetry, options, retry }
    }

    /// Drive the conversation to a final answer. The REPL session is
    /// closed on every exit path, including errors and cancellation.
    pub async fn run(
        mut self,
        query: &str,
        context_text: Option<&str>,
    ) -> Result<LevelOutcome, EngineError> {
        let span = info_span!(
            "reasoning_level",
            recursion_id = %self.ctx.recursion_id,
            depth = self.ctx.depth,
            model = %self.ctx.model_id,
        );
        let result = self.drive(query, context_text).instrument(span).await;
        self.repl.close().await;
        result
    }

    async fn drive(
        &mut self,
        query: &str,
        context_text: Option<&str>,
    ) -> Result<LevelOutcome, EngineError> {
        self.emit(TelemetryEventKind::LevelStarted { query_chars: query.len() });

        if let Some(context) = context_text {
            self.check_cancelled()?;
            let seeded = self.repl.seed_context(context).await;
            if !seeded.is_success() {
                warn!(error_kind = ?seeded.error_kind, "context seeding failed");
            }
        }

        let tools = self.advertised_tools();
        let mut messages = vec![
            ChatMessage::system(system_prompt(self.has_sub())),
            ChatMessage::user(query),
        ];
        let mut usage = Vec::new();

        for iteration in 0..self.ctx.hard_iteration_cap {
            self.ctx.iteration = iteration;
            let completion = self.call_model(&messages, &tools).await?;
            usage.push(completion.usage.clone());
            messages.push(completion.message.clone());

            if completion.content_filtered {
                debug!("stopping on content filter");
                return self.finished(completion.message.content, usage, iteration + 1);
            }
            if !completion.message.has_tool_calls() {
                return self.finished(completion.message.content, usage, iteration + 1);
            }

            for call in &completion.message.tool_calls {
                let content = self.dispatch(call).await?;
                messages.push(ChatMessage::tool(call.id.clone(), content));
            }
        }

        // Cap reached: force a tool-less synthesis turn. With no tools
        // advertised the model cannot extend the conversation further.
        messages.push(ChatMessage::user(FINALIZE_NUDGE));
        let completion = self.call_model(&messages, &[]).await?;
        usage.push(completion.usage.clone());
        let iterations = self.ctx.hard_iteration_cap + 1;
        self.finished(completion.message.content, usage, iterations)
    }

    /// Dispatch one tool call and render its observation. Errors the model
    /// should see come back as tool text; only cancellation and fatal model
    /// faults escape as `Err`.
    async fn dispatch(&self, call: &rlm_core::ToolCall) -> Result<String, EngineError> {
        self.check_cancelled()?;
        let content = match &call.invocation {
            ToolInvocation::CodeExecution { code } => {
                let outputs = self.repl.run_code(code).await;
                self.emit(TelemetryEventKind::CodeExecuted {
                    duration_ms: outputs.duration_ms,
                    error_kind: outputs.error_kind,
                });
                outputs.to_tool_text()
            }
            ToolInvocation::AskSubRlm { query } if self.repl.has_sub() => {
                match self.repl.ask_sub(query).await {
                    Ok(answer) => answer,
                    Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                    Err(err) => {
                        warn!(error = %err, "sub-reasoner failed");
                        ExecOutputs {
                            stdout: String::new(),
                            stderr: err.to_string(),
                            duration_ms: 0,
                            error_kind: Some(ExecErrorKind::SubFailed),
                        }
                        .to_tool_text()
                    }
                }
            }
            // Unrecognized tools and sub calls past the depth budget.
            _ => UNKNOWN_TOOL_TEXT.to_string(),
        };
        Ok(content)
    }

    async fn call_model(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<rlm_model::Completion, EngineError> {
        self.check_cancelled()?;
        let completion = complete_with_retry(
            self.backend.as_ref(),
            &self.ctx.model_id,
            messages,
            tools,
            &self.options,
            self.retry,
        )
        .await?;
        self.emit(TelemetryEventKind::ModelCall { usage: completion.usage.clone() });
        Ok(completion)
    }

    fn advertised_tools(&self) -> Vec<ToolSpec> {
        let mut tools = vec![ToolSpec::code_execution()];
        if self.has_sub() {
            tools.push(ToolSpec::ask_sub_rlm());
        }
        tools
    }

    fn has_sub(&self) -> bool {
        self.repl.has_sub()
    }

    fn finished(
        &self,
        answer: String,
        usage: Vec<UsageRecord>,
        iterations: u32,
    ) -> Result<LevelOutcome, EngineError> {
        self.emit(TelemetryEventKind::LevelFinished { iterations, answer_chars: answer.len() });
        Ok(LevelOutcome { answer, usage, iterations })
    }

    fn check_cancelled(&self) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn emit(&self, kind: TelemetryEventKind) {
        self.telemetry.record(&TelemetryEvent {
            timestamp: Utc::now(),
            recursion_id: self.ctx.recursion_id.clone(),
            parent_recursion_id: self.ctx.parent_recursion_id.clone(),
            depth: self.ctx.depth,
            model_id: self.ctx.model_id.clone(),
            kind,
        });
    }
}
