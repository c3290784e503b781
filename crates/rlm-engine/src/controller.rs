//! Depth-indexed level construction.
//!
//! The controller owns everything a level needs — the model backend, the
//! execution transport, telemetry — and builds the recursion tree one
//! level at a time. Recursion is bounded structurally: a level one short
//! of `max_depth` gets no sub-reasoner factory, so `ask_sub_rlm` is not in
//! its tool set and a stray call to it is answered as an unknown tool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

use rlm_core::{EngineError, LevelContext, UsageRecord};
use rlm_model::{ChatOptions, CompletionBackend, RetryPolicy};

use crate::reasoning::{LevelOutcome, ReasoningLoop};
use crate::repl::{ReplEnv, SubReasoner};
use crate::telemetry::{TelemetryEvent, TelemetryEventKind, TelemetrySink};
use crate::transport::ExecTransport;

/// Static knobs for every level built by one controller.
#[derive(Clone)]
pub struct ControllerConfig {
    pub root_model: String,
    pub sub_models: Vec<String>,
    pub max_depth: u32,
    pub hard_iteration_cap: u32,
    pub options: ChatOptions,
    pub retry: RetryPolicy,
    /// Per-execution wall timeout override, if a task asked for one.
    pub wall_timeout_override_ms: Option<u64>,
}

impl ControllerConfig {
    pub fn new(root_model: impl Into<String>, sub_models: Vec<String>, max_depth: u32) -> Self {
        ControllerConfig {
            root_model: root_model.into(),
            sub_models,
            max_depth: max_depth.max(1),
            hard_iteration_cap: 20,
            options: ChatOptions::default(),
            retry: RetryPolicy::default(),
            wall_timeout_override_ms: None,
        }
    }
}

/// Result of a whole recursion tree.
#[derive(Debug)]
pub struct TreeOutcome {
    pub answer: String,
    pub root_recursion_id: rlm_core::RecursionId,
    /// One aggregate per level, in completion order (children first).
    pub per_level_usage: Vec<UsageRecord>,
    pub iterations: u32,
}

pub struct RecursionController {
    backend: Arc<dyn CompletionBackend>,
    transport: Arc<dyn ExecTransport>,
    telemetry: Arc<dyn TelemetrySink>,
    config: ControllerConfig,
}

impl RecursionController {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        transport: Arc<dyn ExecTransport>,
        telemetry: Arc<dyn TelemetrySink>,
        config: ControllerConfig,
    ) -> Arc<Self> {
        Arc::new(RecursionController { backend, transport, telemetry, config })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Copy of this controller with per-task overrides applied.
    pub fn with_overrides(
        self: &Arc<Self>,
        max_depth: Option<u32>,
        wall_timeout_override_ms: Option<u64>,
        root_model: Option<String>,
    ) -> Arc<Self> {
        if max_depth.is_none() && wall_timeout_override_ms.is_none() && root_model.is_none() {
            return Arc::clone(self);
        }
        let mut config = self.config.clone();
        if let Some(depth) = max_depth {
            config.max_depth = depth.max(1);
        }
        if wall_timeout_override_ms.is_some() {
            config.wall_timeout_override_ms = wall_timeout_override_ms;
        }
        if let Some(model) = root_model {
            config.root_model = model;
        }
        RecursionController::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.transport),
            Arc::clone(&self.telemetry),
            config,
        )
    }

    /// Run a depth-0 tree to completion.
    pub async fn run_root(
        self: &Arc<Self>,
        query: String,
        context_text: Option<String>,
        cancel: CancellationToken,
    ) -> Result<TreeOutcome, EngineError> {
        let ctx = LevelContext::root(
            self.config.root_model.clone(),
            self.config.sub_models.clone(),
            self.config.max_depth,
            self.config.hard_iteration_cap,
        );
        let root_recursion_id = ctx.recursion_id.clone();
        let ledger = Arc::new(Mutex::new(Vec::new()));
        let outcome = self
            .run_level(ctx, query, context_text, cancel, Arc::clone(&ledger))
            .await?;
        let per_level_usage = {
            let mut ledger = ledger.lock().expect("usage ledger lock");
            std::mem::take(&mut *ledger)
        };
        Ok(TreeOutcome {
            answer: outcome.answer,
            root_recursion_id,
            per_level_usage,
            iterations: outcome.iterations,
        })
    }

    /// Run one level. Boxed because the sub-reasoner path re-enters this
    /// function one depth down.
    fn run_level(
        self: &Arc<Self>,
        ctx: LevelContext,
        query: String,
        context_text: Option<String>,
        cancel: CancellationToken,
        ledger: Arc<Mutex<Vec<UsageRecord>>>,
    ) -> BoxFuture<'static, Result<LevelOutcome, EngineError>> {
        let controller = Arc::clone(self);
        async move {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let sub: Option<Arc<dyn SubReasoner>> = if ctx.may_recurse() {
                Some(Arc::new(ChildReasoner {
                    controller: Arc::clone(&controller),
                    parent_ctx: ctx.clone(),
                    cancel: cancel.clone(),
                    ledger: Arc::clone(&ledger),
                }))
            } else {
                None
            };

            let repl = ReplEnv::open(
                Arc::clone(&controller.transport),
                sub,
                Some(format!("rlm-{}", ctx.recursion_id)),
                controller.config.wall_timeout_override_ms,
            )
            .await?;

            let level = ReasoningLoop::new(
                Arc::clone(&controller.backend),
                ctx,
                repl,
                cancel,
                Arc::clone(&controller.telemetry),
                controller.config.options.clone(),
                controller.config.retry,
            );
            let outcome = level.run(&query, context_text.as_deref()).await?;

            let aggregate = UsageRecord::total_of(&outcome.usage);
            ledger.lock().expect("usage ledger lock").push(aggregate);
            Ok(outcome)
        }
        .boxed()
    }
}

/// Sub-reasoner bound into a parent's REPL environment. Holds no reference
/// to the parent loop — only the controller, the parent's context for
/// lineage, and the shared usage ledger.
struct ChildReasoner {
    controller: Arc<RecursionController>,
    parent_ctx: LevelContext,
    cancel: CancellationToken,
    ledger: Arc<Mutex<Vec<UsageRecord>>>,
}

#[async_trait]
impl SubReasoner for ChildReasoner {
    async fn run(&self, query: String) -> Result<String, EngineError> {
        let ctx = self.parent_ctx.child();
        self.controller.telemetry.record(&TelemetryEvent {
            timestamp: Utc::now(),
            recursion_id: self.parent_ctx.recursion_id.clone(),
            parent_recursion_id: self.parent_ctx.parent_recursion_id.clone(),
            depth: self.parent_ctx.depth,
            model_id: self.parent_ctx.model_id.clone(),
            kind: TelemetryEventKind::SubCall { child_recursion_id: ctx.recursion_id.clone() },
        });
        // Sub-levels start fresh: no context inheritance, only the query.
        let outcome = self
            .controller
            .run_level(ctx, query, None, self.cancel.child_token(), Arc::clone(&self.ledger))
            .await?;
        Ok(outcome.answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_clamp_depth_to_at_least_one() {
        let config = ControllerConfig::new("m", vec![], 0);
        assert_eq!(config.max_depth, 1);
    }
}
