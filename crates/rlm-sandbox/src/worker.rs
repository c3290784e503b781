//! Dedicated worker thread per sandbox.
//!
//! The interpreter is not `Send`, so each session pins one to an OS thread
//! and talks to it over an unbounded command channel. Replies come back on
//! oneshot channels; a host-side timeout slightly above the wall deadline
//! guards against a wedged interpreter.

use std::thread;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use rlm_core::{ExecErrorKind, ExecLimits, ExecOutputs, SessionError, SessionId};

use crate::interpreter::PySandbox;

/// Slack added to the in-VM deadline before the host gives up waiting.
const HOST_TIMEOUT_SLACK: Duration = Duration::from_millis(2_000);

enum Command {
    Execute {
        code: String,
        limits: ExecLimits,
        reply: oneshot::Sender<ExecOutputs>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Async handle to one session's interpreter thread.
pub struct SandboxHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SandboxHandle {
    /// Spawn the worker thread. Interpreter construction happens on the
    /// worker; the first execution waits for it.
    pub fn spawn(session_id: &SessionId) -> Result<Self, SessionError> {
        let (commands, mut inbox) = mpsc::unbounded_channel::<Command>();
        let thread_name = format!("rlm-sandbox-{}", &session_id.as_str()[..8.min(session_id.as_str().len())]);
        let id_for_log = session_id.clone();

        thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let mut sandbox = match PySandbox::new() {
                    Ok(sandbox) => sandbox,
                    Err(err) => {
                        warn!(session = %id_for_log, error = %err, "interpreter init failed");
                        // Drain commands with a failure so callers get an
                        // answer instead of a dropped channel.
                        while let Some(command) = inbox.blocking_recv() {
                            match command {
                                Command::Execute { reply, .. } => {
                                    let _ = reply.send(ExecOutputs {
                                        stdout: String::new(),
                                        stderr: format!("interpreter init failed: {err}"),
                                        duration_ms: 0,
                                        error_kind: Some(ExecErrorKind::Runtime),
                                    });
                                }
                                Command::Shutdown { reply } => {
                                    let _ = reply.send(());
                                    return;
                                }
                            }
                        }
                        return;
                    }
                };
                debug!(session = %id_for_log, "sandbox worker ready");
                while let Some(command) = inbox.blocking_recv() {
                    match command {
                        Command::Execute { code, limits, reply } => {
                            let outputs = sandbox.execute(&code, &limits);
                            let _ = reply.send(outputs);
                        }
                        Command::Shutdown { reply } => {
                            let _ = reply.send(());
                            break;
                        }
                    }
                }
                debug!(session = %id_for_log, "sandbox worker stopped");
            })
            .map_err(|err| SessionError::Sandbox(format!("failed to spawn worker thread: {err}")))?;

        Ok(SandboxHandle { commands })
    }

    /// Execute one code string, waiting at most the wall deadline plus a
    /// fixed slack. A host-side expiry reports `timeout`; the worker keeps
    /// running and its in-VM deadline will unwind the execution.
    pub async fn execute(&self, code: String, limits: ExecLimits) -> Result<ExecOutputs, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Execute { code, limits, reply })
            .map_err(|_| SessionError::Sandbox("sandbox worker is gone".into()))?;

        let host_budget = Duration::from_millis(limits.wall_timeout_ms) + HOST_TIMEOUT_SLACK;
        match tokio::time::timeout(host_budget, rx).await {
            Ok(Ok(outputs)) => Ok(outputs),
            Ok(Err(_)) => Err(SessionError::Sandbox("sandbox worker dropped the reply".into())),
            Err(_) => Ok(ExecOutputs {
                stdout: String::new(),
                stderr: "execution did not return within the wall timeout".into(),
                duration_ms: host_budget.as_millis() as u64,
                error_kind: Some(ExecErrorKind::Timeout),
            }),
        }
    }

    /// Ask the worker to exit. Waits for acknowledgement so the interpreter
    /// is gone before the session is considered destroyed.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }
    }
}
