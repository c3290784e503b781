//! End-to-end reasoning scenarios: scripted model, real sandbox sessions,
//! in-process transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use rlm_core::config::{CoordinatorConfig, SessionConfig};
use rlm_core::{ExecErrorKind, ExecOutputs, Role, SessionId, TransportError};
use rlm_engine::{
    ControllerConfig, ExecTransport, InProcessTransport, RecordingSink, RecursionController,
    Task, TaskCoordinator, TaskError, TaskOptions, TelemetryEventKind, TelemetrySink,
};
use rlm_model::{ChatOptions, Completion, CompletionBackend, ToolSpec};
use rlm_sandbox::SessionManager;
use rlm_testing::{code_turn, filtered_turn, sub_turn, text_turn, tool_turn, MockModel};

struct Harness {
    manager: Arc<SessionManager>,
    transport: Arc<CountingTransport>,
    mock: Arc<MockModel>,
    sink: Arc<RecordingSink>,
    controller: Arc<RecursionController>,
}

/// Transport wrapper counting session creations, to catch levels that
/// open sessions they should not.
struct CountingTransport {
    inner: InProcessTransport,
    created: AtomicUsize,
}

#[async_trait]
impl ExecTransport for CountingTransport {
    async fn create_session(&self, owner_tag: Option<String>) -> Result<SessionId, TransportError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.inner.create_session(owner_tag).await
    }

    async fn execute(
        &self,
        session: &SessionId,
        code: &str,
        timeout_override_ms: Option<u64>,
    ) -> Result<ExecOutputs, TransportError> {
        self.inner.execute(session, code, timeout_override_ms).await
    }

    async fn destroy_session(&self, session: &SessionId) -> Result<(), TransportError> {
        self.inner.destroy_session(session).await
    }

    async fn health(&self) -> Result<(), TransportError> {
        self.inner.health().await
    }
}

fn harness(turns: Vec<Completion>, config: ControllerConfig) -> Harness {
    let manager = Arc::new(SessionManager::new(SessionConfig::default()));
    let transport = Arc::new(CountingTransport {
        inner: InProcessTransport::new(Arc::clone(&manager)),
        created: AtomicUsize::new(0),
    });
    let mock = Arc::new(MockModel::script(turns));
    let sink = Arc::new(RecordingSink::default());
    let controller = RecursionController::new(
        Arc::clone(&mock) as Arc<dyn CompletionBackend>,
        Arc::clone(&transport) as Arc<dyn ExecTransport>,
        Arc::clone(&sink) as Arc<dyn TelemetrySink>,
        config,
    );
    Harness { manager, transport, mock, sink, controller }
}

#[tokio::test]
async fn hello_world_executes_one_code_call() {
    let h = harness(
        vec![
            code_turn("m-root", "c1", "print(21+21)"),
            text_turn("m-root", "The result is 42."),
        ],
        ControllerConfig::new("m-root", vec![], 1),
    );

    let outcome = h
        .controller
        .run_root("print 21+21".into(), None, CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.answer.contains("42"));
    assert_eq!(h.mock.call_count(), 2);
    // max_depth = 1: no depth budget, so only code execution is advertised.
    assert_eq!(h.mock.tools_at(0), vec!["code_execution"]);

    // The second call saw the observation of the first.
    let second = &h.mock.observed_calls()[1];
    let tool_msg = second.messages.last().unwrap();
    assert_eq!(tool_msg.role, Role::Tool);
    assert_eq!(tool_msg.content, "<stdout>42\n</stdout>");

    assert_eq!(h.manager.live_count(), 0, "session leaked");
}

#[tokio::test]
async fn state_persists_across_turns_in_one_level() {
    let h = harness(
        vec![
            code_turn("m-root", "c1", "x = 7"),
            code_turn("m-root", "c2", "print(x*6)"),
            text_turn("m-root", "42"),
        ],
        ControllerConfig::new("m-root", vec![], 1),
    );

    let outcome = h
        .controller
        .run_root("compute".into(), None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.answer, "42");
    let third = &h.mock.observed_calls()[2];
    let tool_msg = third.messages.last().unwrap();
    assert_eq!(tool_msg.content, "<stdout>42\n</stdout>");
    assert_eq!(h.manager.live_count(), 0);
}

#[tokio::test]
async fn infinite_loop_times_out_and_the_level_still_answers() {
    let mut config = ControllerConfig::new("m-root", vec![], 1);
    config.wall_timeout_override_ms = Some(500);
    let h = harness(
        vec![
            code_turn("m-root", "c1", "while True:\n    pass"),
            text_turn("m-root", "The computation did not terminate."),
        ],
        config,
    );

    let outcome = h
        .controller
        .run_root("loop forever".into(), None, CancellationToken::new())
        .await
        .unwrap();

    assert!(!outcome.answer.is_empty());
    let second = &h.mock.observed_calls()[1];
    let tool_msg = second.messages.last().unwrap();
    assert!(tool_msg.content.contains("<error>timeout</error>"), "got: {}", tool_msg.content);

    let timed_out = h.sink.events().into_iter().find_map(|event| match event.kind {
        TelemetryEventKind::CodeExecuted { duration_ms, error_kind } => Some((duration_ms, error_kind)),
        _ => None,
    });
    let (duration_ms, error_kind) = timed_out.expect("no execution event recorded");
    assert_eq!(error_kind, Some(ExecErrorKind::Timeout));
    assert!((450..=1600).contains(&duration_ms), "duration: {duration_ms}ms");
    assert_eq!(h.manager.live_count(), 0);
}

#[tokio::test]
async fn depth_two_recursion_delegates_and_returns_verbatim() {
    let h = harness(
        vec![
            // Root asks the sub-reasoner.
            sub_turn("m-root", "c1", "what is 3+4"),
            // Child answers directly.
            text_turn("m-sub", "7"),
            // Root concludes.
            text_turn("m-root", "The sub-reasoner says 7."),
        ],
        ControllerConfig::new("m-root", vec!["m-sub".into()], 2),
    );

    let outcome = h
        .controller
        .run_root("delegate this".into(), None, CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.answer.contains('7'));
    // Root level advertises both tools; the child sits at depth+1 ==
    // max_depth and gets code execution only.
    assert_eq!(h.mock.tools_at(0), vec!["code_execution", "ask_sub_rlm"]);
    assert_eq!(h.mock.tools_at(1), vec!["code_execution"]);
    assert_eq!(h.mock.observed_calls()[1].model_id, "m-sub");

    // The child's answer lands verbatim as the parent's tool message.
    let root_second = &h.mock.observed_calls()[2];
    let tool_msg = root_second.messages.last().unwrap();
    assert_eq!(tool_msg.role, Role::Tool);
    assert_eq!(tool_msg.content, "7");

    // Two levels, two sessions, both gone.
    assert_eq!(h.transport.created.load(Ordering::SeqCst), 2);
    assert_eq!(h.manager.live_count(), 0);

    // One aggregate usage record per level.
    assert_eq!(outcome.per_level_usage.len(), 2);
}

#[tokio::test]
async fn base_case_rejects_sub_calls_without_spawning_levels() {
    let h = harness(
        vec![
            sub_turn("m-root", "c1", "delegate further"),
            // The child tries to recurse even though the tool is absent.
            sub_turn("m-sub", "c2", "go deeper"),
            text_turn("m-sub", "fine, doing it myself: 7"),
            text_turn("m-root", "7 it is."),
        ],
        ControllerConfig::new("m-root", vec!["m-sub".into()], 2),
    );

    let outcome = h
        .controller
        .run_root("delegate this".into(), None, CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.answer.contains('7'));
    // The child's stray ask_sub_rlm was answered as an unknown tool...
    let child_second = &h.mock.observed_calls()[2];
    let tool_msg = child_second.messages.last().unwrap();
    assert_eq!(tool_msg.content, "<error>unknown_tool</error>");
    // ...and no third level came into being: one session per real level.
    assert_eq!(h.transport.created.load(Ordering::SeqCst), 2);
    assert_eq!(h.manager.live_count(), 0);
}

#[tokio::test]
async fn parallel_tasks_do_not_share_session_state() {
    let manager = Arc::new(SessionManager::new(SessionConfig::default()));

    let build = |secret: u32, mock_turns: Vec<Completion>| {
        let transport: Arc<dyn ExecTransport> =
            Arc::new(InProcessTransport::new(Arc::clone(&manager)));
        let mock = Arc::new(MockModel::script(mock_turns));
        let controller = RecursionController::new(
            Arc::clone(&mock) as Arc<dyn CompletionBackend>,
            transport,
            Arc::new(RecordingSink::default()) as Arc<dyn TelemetrySink>,
            ControllerConfig::new(format!("m-{secret}"), vec![], 1),
        );
        (mock, controller)
    };

    let (mock_a, controller_a) = build(
        101,
        vec![
            code_turn("m-101", "c1", "secret = 101"),
            code_turn("m-101", "c2", "print(secret)"),
            text_turn("m-101", "done"),
        ],
    );
    let (mock_b, controller_b) = build(
        202,
        vec![
            code_turn("m-202", "c1", "secret = 202"),
            code_turn("m-202", "c2", "print(secret)"),
            text_turn("m-202", "done"),
        ],
    );

    let (a, b) = tokio::join!(
        controller_a.run_root("task a".into(), None, CancellationToken::new()),
        controller_b.run_root("task b".into(), None, CancellationToken::new()),
    );
    a.unwrap();
    b.unwrap();

    let observed_a = &mock_a.observed_calls()[2];
    assert_eq!(observed_a.messages.last().unwrap().content, "<stdout>101\n</stdout>");
    let observed_b = &mock_b.observed_calls()[2];
    assert_eq!(observed_b.messages.last().unwrap().content, "<stdout>202\n</stdout>");
    assert_eq!(manager.live_count(), 0);
}

#[tokio::test]
async fn tool_calls_within_one_turn_are_observed_in_emitted_order() {
    let h = harness(
        vec![
            tool_turn(
                "m-root",
                vec![
                    rlm_core::ToolCall::code_execution("c1", "print('first')"),
                    rlm_core::ToolCall::code_execution("c2", "print('second')"),
                ],
            ),
            text_turn("m-root", "ok"),
        ],
        ControllerConfig::new("m-root", vec![], 1),
    );

    h.controller
        .run_root("two calls".into(), None, CancellationToken::new())
        .await
        .unwrap();

    let second = &h.mock.observed_calls()[1];
    let n = second.messages.len();
    let first_obs = &second.messages[n - 2];
    let second_obs = &second.messages[n - 1];
    assert_eq!(first_obs.tool_call_id.as_deref(), Some("c1"));
    assert_eq!(first_obs.content, "<stdout>first\n</stdout>");
    assert_eq!(second_obs.tool_call_id.as_deref(), Some("c2"));
    assert_eq!(second_obs.content, "<stdout>second\n</stdout>");
}

#[tokio::test]
async fn iteration_cap_forces_a_tool_less_synthesis_turn() {
    let mut config = ControllerConfig::new("m-root", vec![], 1);
    config.hard_iteration_cap = 2;
    let h = harness(
        vec![
            code_turn("m-root", "c1", "pass"),
            code_turn("m-root", "c2", "pass"),
            // Forced synthesis turn.
            text_turn("m-root", "best effort answer"),
        ],
        config,
    );

    let outcome = h
        .controller
        .run_root("never stops".into(), None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.answer, "best effort answer");
    assert_eq!(h.mock.call_count(), 3);
    // The synthesis call advertises no tools at all.
    assert!(h.mock.tools_at(2).is_empty());
    // And it was preceded by the finalize nudge as a user message.
    let last_call = &h.mock.observed_calls()[2];
    let nudge = &last_call.messages[last_call.messages.len() - 1];
    assert_eq!(nudge.role, Role::User);
    assert!(nudge.content.contains("final answer"));
}

#[tokio::test]
async fn content_filtered_stops_the_loop() {
    let h = harness(
        vec![filtered_turn("m-root")],
        ControllerConfig::new("m-root", vec![], 1),
    );

    let outcome = h
        .controller
        .run_root("anything".into(), None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.answer, "");
    assert_eq!(h.mock.call_count(), 1);
    assert_eq!(h.manager.live_count(), 0);
}

#[tokio::test]
async fn context_text_is_seeded_into_the_session() {
    let h = harness(
        vec![
            code_turn("m-root", "c1", "print(context)"),
            text_turn("m-root", "echoed"),
        ],
        ControllerConfig::new("m-root", vec![], 1),
    );

    h.controller
        .run_root(
            "what does the context say".into(),
            Some("needle-in-context".into()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let second = &h.mock.observed_calls()[1];
    assert_eq!(second.messages.last().unwrap().content, "<stdout>needle-in-context\n</stdout>");
}

#[tokio::test]
async fn json_context_is_seeded_as_a_parsed_value() {
    let h = harness(
        vec![
            code_turn("m-root", "c1", "print(context[\"key\"], len(context[\"items\"]))"),
            text_turn("m-root", "echoed"),
        ],
        ControllerConfig::new("m-root", vec![], 1),
    );

    h.controller
        .run_root(
            "inspect the context".into(),
            Some(r#"{"key": "nested-needle", "items": [1, 2, 3]}"#.into()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // The context arrived as a dict, not as the raw JSON text.
    let second = &h.mock.observed_calls()[1];
    assert_eq!(second.messages.last().unwrap().content, "<stdout>nested-needle 3\n</stdout>");
}

/// Backend that fails fatally for one model id and delegates otherwise.
struct FailingModel {
    inner: Arc<MockModel>,
    fail_model: &'static str,
}

#[async_trait]
impl CompletionBackend for FailingModel {
    async fn complete(
        &self,
        model_id: &str,
        messages: &[rlm_core::ChatMessage],
        tools: &[ToolSpec],
        options: &ChatOptions,
    ) -> Result<Completion, rlm_core::ModelError> {
        if model_id == self.fail_model {
            return Err(rlm_core::ModelError::InvalidRequest("scripted failure".into()));
        }
        self.inner.complete(model_id, messages, tools, options).await
    }
}

#[tokio::test]
async fn sub_reasoner_failure_is_reported_as_a_tool_error() {
    let manager = Arc::new(SessionManager::new(SessionConfig::default()));
    let transport: Arc<dyn ExecTransport> = Arc::new(InProcessTransport::new(Arc::clone(&manager)));
    let mock = Arc::new(MockModel::script(vec![
        sub_turn("m-root", "c1", "delegate"),
        text_turn("m-root", "carried on without the sub-reasoner"),
    ]));
    let backend = Arc::new(FailingModel { inner: Arc::clone(&mock), fail_model: "m-sub" });
    let controller = RecursionController::new(
        backend as Arc<dyn CompletionBackend>,
        transport,
        Arc::new(RecordingSink::default()) as Arc<dyn TelemetrySink>,
        ControllerConfig::new("m-root", vec!["m-sub".into()], 2),
    );

    let outcome = controller
        .run_root("delegate this".into(), None, CancellationToken::new())
        .await
        .unwrap();

    // The parent observed the failure and still answered.
    assert!(outcome.answer.contains("carried on"));
    let root_second = &mock.observed_calls()[1];
    let tool_msg = root_second.messages.last().unwrap();
    assert!(tool_msg.content.contains("<error>sub_failed</error>"), "got: {}", tool_msg.content);
    assert_eq!(manager.live_count(), 0);
}

/// Transport whose executes always fail after session creation succeeds.
struct BrokenExecTransport {
    inner: InProcessTransport,
}

#[async_trait]
impl ExecTransport for BrokenExecTransport {
    async fn create_session(&self, owner_tag: Option<String>) -> Result<SessionId, TransportError> {
        self.inner.create_session(owner_tag).await
    }

    async fn execute(
        &self,
        _session: &SessionId,
        _code: &str,
        _timeout_override_ms: Option<u64>,
    ) -> Result<ExecOutputs, TransportError> {
        Err(TransportError::Unavailable("connection refused".into()))
    }

    async fn destroy_session(&self, session: &SessionId) -> Result<(), TransportError> {
        self.inner.destroy_session(session).await
    }

    async fn health(&self) -> Result<(), TransportError> {
        self.inner.health().await
    }
}

#[tokio::test]
async fn transport_failure_becomes_a_model_visible_observation() {
    let manager = Arc::new(SessionManager::new(SessionConfig::default()));
    let transport: Arc<dyn ExecTransport> = Arc::new(BrokenExecTransport {
        inner: InProcessTransport::new(Arc::clone(&manager)),
    });
    let mock = Arc::new(MockModel::script(vec![
        code_turn("m-root", "c1", "print(1)"),
        text_turn("m-root", "could not run any code"),
    ]));
    let controller = RecursionController::new(
        Arc::clone(&mock) as Arc<dyn CompletionBackend>,
        transport,
        Arc::new(RecordingSink::default()) as Arc<dyn TelemetrySink>,
        ControllerConfig::new("m-root", vec![], 1),
    );

    let outcome = controller
        .run_root("try anyway".into(), None, CancellationToken::new())
        .await
        .unwrap();

    assert!(!outcome.answer.is_empty());
    let second = &mock.observed_calls()[1];
    let tool_msg = second.messages.last().unwrap();
    assert!(
        tool_msg.content.contains("<error>transport_unavailable</error>"),
        "got: {}",
        tool_msg.content
    );
}

#[tokio::test]
async fn retry_exhaustion_surfaces_as_model_unavailable() {
    struct AlwaysDown;
    #[async_trait]
    impl CompletionBackend for AlwaysDown {
        async fn complete(
            &self,
            _model_id: &str,
            _messages: &[rlm_core::ChatMessage],
            _tools: &[ToolSpec],
            _options: &ChatOptions,
        ) -> Result<Completion, rlm_core::ModelError> {
            Err(rlm_core::ModelError::TransientNetwork("connection reset".into()))
        }
    }

    let manager = Arc::new(SessionManager::new(SessionConfig::default()));
    let transport: Arc<dyn ExecTransport> = Arc::new(InProcessTransport::new(Arc::clone(&manager)));
    let mut config = ControllerConfig::new("m-root", vec![], 1);
    config.retry = rlm_model::RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
        total_budget: Duration::from_millis(50),
    };
    let controller = RecursionController::new(
        Arc::new(AlwaysDown) as Arc<dyn CompletionBackend>,
        transport,
        Arc::new(RecordingSink::default()) as Arc<dyn TelemetrySink>,
        config,
    );
    let coordinator = TaskCoordinator::new(controller, CoordinatorConfig::default());

    let result = coordinator.submit(Task::new("doomed")).await.join().await;
    assert!(matches!(result.error, Some(TaskError::ModelUnavailable { .. })));
    assert_eq!(manager.live_count(), 0);
}

#[tokio::test]
async fn session_creation_retries_once_after_capacity_rejection() {
    let config = SessionConfig { max_sessions: 1, ..SessionConfig::default() };
    let manager = Arc::new(SessionManager::new(config));
    let transport: Arc<dyn ExecTransport> = Arc::new(InProcessTransport::new(Arc::clone(&manager)));

    // Occupy the only slot, freeing it shortly after the first rejection.
    let blocker = manager.create_session(None).unwrap();
    {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            manager.destroy_session(&blocker).await;
        });
    }

    let mock = Arc::new(MockModel::script(vec![text_turn("m-root", "made it")]));
    let controller = RecursionController::new(
        mock as Arc<dyn CompletionBackend>,
        transport,
        Arc::new(RecordingSink::default()) as Arc<dyn TelemetrySink>,
        ControllerConfig::new("m-root", vec![], 1),
    );

    let outcome = controller
        .run_root("wait for a slot".into(), None, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.answer, "made it");
    assert_eq!(manager.live_count(), 0);
}

#[tokio::test]
async fn recursion_lineage_forms_a_tree_in_telemetry() {
    let h = harness(
        vec![
            sub_turn("m-root", "c1", "what is 3+4"),
            text_turn("m-sub", "7"),
            text_turn("m-root", "7"),
        ],
        ControllerConfig::new("m-root", vec!["m-sub".into()], 2),
    );

    let outcome = h
        .controller
        .run_root("delegate".into(), None, CancellationToken::new())
        .await
        .unwrap();

    let events = h.sink.events();
    let root_started = events
        .iter()
        .find(|e| e.depth == 0 && matches!(e.kind, TelemetryEventKind::LevelStarted { .. }))
        .expect("no root level event");
    assert_eq!(root_started.recursion_id, outcome.root_recursion_id);
    assert!(root_started.parent_recursion_id.is_none());

    let child_started = events
        .iter()
        .find(|e| e.depth == 1 && matches!(e.kind, TelemetryEventKind::LevelStarted { .. }))
        .expect("no child level event");
    assert_eq!(
        child_started.parent_recursion_id.as_ref(),
        Some(&outcome.root_recursion_id)
    );
    assert_ne!(child_started.recursion_id, outcome.root_recursion_id);

    // The parent also recorded the delegation itself.
    let sub_call = events
        .iter()
        .find_map(|e| match &e.kind {
            TelemetryEventKind::SubCall { child_recursion_id } => Some(child_recursion_id.clone()),
            _ => None,
        })
        .expect("no sub-call event");
    assert_eq!(sub_call, child_started.recursion_id);
}

/// Backend that delays every scripted turn, to give cancellation a window.
struct SlowBackend {
    inner: Arc<MockModel>,
    delay: Duration,
}

#[async_trait]
impl CompletionBackend for SlowBackend {
    async fn complete(
        &self,
        model_id: &str,
        messages: &[rlm_core::ChatMessage],
        tools: &[ToolSpec],
        options: &ChatOptions,
    ) -> Result<Completion, rlm_core::ModelError> {
        tokio::time::sleep(self.delay).await;
        self.inner.complete(model_id, messages, tools, options).await
    }
}

#[tokio::test]
async fn cancellation_resolves_the_task_and_closes_sessions() {
    let manager = Arc::new(SessionManager::new(SessionConfig::default()));
    let transport: Arc<dyn ExecTransport> = Arc::new(InProcessTransport::new(Arc::clone(&manager)));
    let mock = Arc::new(MockModel::script(vec![
        code_turn("m-root", "c1", "pass"),
        code_turn("m-root", "c2", "pass"),
        text_turn("m-root", "never reached"),
    ]));
    let backend = Arc::new(SlowBackend { inner: mock, delay: Duration::from_millis(200) });
    let controller = RecursionController::new(
        backend as Arc<dyn CompletionBackend>,
        transport,
        Arc::new(RecordingSink::default()) as Arc<dyn TelemetrySink>,
        ControllerConfig::new("m-root", vec![], 1),
    );
    let coordinator = TaskCoordinator::new(controller, CoordinatorConfig::default());

    let handle = coordinator.submit(Task::new("slow task")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();
    let result = handle.join().await;

    assert_eq!(result.error, Some(TaskError::Cancelled));
    // The level's close path ran: nothing left in the session table.
    assert_eq!(manager.live_count(), 0);
}

#[tokio::test]
async fn deadline_maps_to_deadline_exceeded() {
    let manager = Arc::new(SessionManager::new(SessionConfig::default()));
    let transport: Arc<dyn ExecTransport> = Arc::new(InProcessTransport::new(Arc::clone(&manager)));
    let mock = Arc::new(MockModel::script(vec![
        code_turn("m-root", "c1", "pass"),
        code_turn("m-root", "c2", "pass"),
        text_turn("m-root", "never reached"),
    ]));
    let backend = Arc::new(SlowBackend { inner: mock, delay: Duration::from_millis(200) });
    let controller = RecursionController::new(
        backend as Arc<dyn CompletionBackend>,
        transport,
        Arc::new(RecordingSink::default()) as Arc<dyn TelemetrySink>,
        ControllerConfig::new("m-root", vec![], 1),
    );
    let coordinator = TaskCoordinator::new(controller, CoordinatorConfig::default());

    let options = TaskOptions { deadline: Some(Duration::from_millis(100)), ..TaskOptions::default() };
    let handle = coordinator
        .submit(Task::new("deadline task").with_options(options))
        .await;
    let result = handle.join().await;

    assert_eq!(result.error, Some(TaskError::DeadlineExceeded));
    assert_eq!(manager.live_count(), 0);
}

#[tokio::test]
async fn batch_submission_completes_under_the_permit_cap() {
    let manager = Arc::new(SessionManager::new(SessionConfig::default()));
    let transport: Arc<dyn ExecTransport> = Arc::new(InProcessTransport::new(Arc::clone(&manager)));
    let mock = Arc::new(MockModel::script(vec![
        text_turn("m-root", "done"),
        text_turn("m-root", "done"),
        text_turn("m-root", "done"),
    ]));
    let controller = RecursionController::new(
        mock as Arc<dyn CompletionBackend>,
        transport,
        Arc::new(RecordingSink::default()) as Arc<dyn TelemetrySink>,
        ControllerConfig::new("m-root", vec![], 1),
    );
    let config = CoordinatorConfig { concurrency: 2, worker_pool_size: 2, queue_depth: 16 };
    let coordinator = TaskCoordinator::new(controller, config);

    let handles = coordinator
        .submit_batch(vec![Task::new("a"), Task::new("b"), Task::new("c")])
        .await;
    for handle in handles {
        let result = handle.join().await;
        assert!(result.is_success(), "task failed: {:?}", result.error);
        assert_eq!(result.answer, "done");
    }
    assert_eq!(manager.live_count(), 0);
    coordinator.shutdown().await;
}
