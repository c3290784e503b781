use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use rlm_core::config::{RlmConfig, SessionConfig, TransportKind};
use rlm_engine::{
    ControllerConfig, ExecTransport, HttpExecTransport, InProcessTransport, RecursionController,
    Task, TaskCoordinator, TaskOptions, TracingSink,
};
use rlm_http::{exec_router, infer_router, shutdown_signal, ExecServiceState, InferServiceState};
use rlm_model::{CompletionBackend, HttpModelClient, RetryPolicy};
use rlm_sandbox::{spawn_reaper, SessionManager};

#[derive(Parser, Debug)]
#[command(name = "rlm", version)]
#[command(about = "Recursive language model runtime")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the execution plane (sessions + sandboxed execution)
    ExecService {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Serve the inference surface (POST /infer)
    InferService {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
    /// Run a single query from the terminal
    Ask {
        /// The question to answer
        query: String,
        /// File whose contents become the task context
        #[arg(long)]
        context_file: Option<String>,
        /// Recursion depth budget for this query
        #[arg(long)]
        max_depth: Option<u32>,
    },
}

fn main() -> ExitCode {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::ExecService { host, port } => runtime.block_on(serve_exec(host, port)),
        Commands::InferService { host, port } => runtime.block_on(serve_infer(host, port)),
        Commands::Ask { query, context_file, max_depth } => {
            runtime.block_on(ask(query, context_file, max_depth))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve_exec(host: String, port: u16) -> Result<(), String> {
    let session_config = SessionConfig::from_env().map_err(|e| e.to_string())?;
    let manager = Arc::new(SessionManager::new(session_config));
    let reaper_shutdown = CancellationToken::new();
    let reaper = spawn_reaper(Arc::clone(&manager), reaper_shutdown.clone());

    let state = ExecServiceState::new(Arc::clone(&manager));
    state.warm_up().await;
    let app = exec_router(state);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .map_err(|e| format!("failed to bind {host}:{port}: {e}"))?;
    info!(%host, port, "execution service listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("server error: {e}"))?;

    reaper_shutdown.cancel();
    let _ = reaper.await;
    Ok(())
}

async fn serve_infer(host: String, port: u16) -> Result<(), String> {
    let config = RlmConfig::from_env().map_err(|e| e.to_string())?;
    let (coordinator, _reaper_guard) = build_coordinator(&config)?;

    let app = infer_router(InferServiceState {
        coordinator: Arc::new(coordinator),
        request_deadline: None,
    });

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .map_err(|e| format!("failed to bind {host}:{port}: {e}"))?;
    info!(%host, port, "inference service listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("server error: {e}"))
}

async fn ask(
    query: String,
    context_file: Option<String>,
    max_depth: Option<u32>,
) -> Result<(), String> {
    let config = RlmConfig::from_env().map_err(|e| e.to_string())?;
    let (coordinator, _reaper_guard) = build_coordinator(&config)?;

    let context_text = match context_file {
        Some(path) => Some(
            std::fs::read_to_string(&path).map_err(|e| format!("cannot read {path}: {e}"))?,
        ),
        None => None,
    };

    let mut task = Task::new(query);
    if let Some(context) = context_text {
        task = task.with_context(context);
    }
    task = task.with_options(TaskOptions { max_depth, ..TaskOptions::default() });

    let handle = coordinator.submit(task).await;
    let result = handle.join().await;
    match result.error {
        None => {
            println!("{}", result.answer);
            info!(
                total_tokens = result.usage_total.total_tokens,
                wallclock_ms = result.wallclock_ms,
                levels = result.per_level_usage.len(),
                "query finished"
            );
            Ok(())
        }
        Some(err) => Err(err.to_string()),
    }
}

/// Reaper task bound to the in-process session manager, if one exists.
/// Dropping the guard cancels it.
struct ReaperGuard {
    shutdown: CancellationToken,
}

impl Drop for ReaperGuard {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn build_coordinator(config: &RlmConfig) -> Result<(TaskCoordinator, Option<ReaperGuard>), String> {
    let backend: Arc<dyn CompletionBackend> = Arc::new(
        HttpModelClient::new(
            config.model.base_url.clone(),
            config.model.api_key.clone(),
            config.model.model_timeout,
        )
        .map_err(|e| e.to_string())?,
    );

    let (transport, reaper_guard): (Arc<dyn ExecTransport>, Option<ReaperGuard>) =
        match config.transport {
            TransportKind::InProcess => {
                let manager = Arc::new(SessionManager::new(config.session.clone()));
                let shutdown = CancellationToken::new();
                spawn_reaper(Arc::clone(&manager), shutdown.clone());
                (
                    Arc::new(InProcessTransport::new(manager)),
                    Some(ReaperGuard { shutdown }),
                )
            }
            TransportKind::Loopback | TransportKind::Remote => {
                let url = config
                    .execute_service_url
                    .clone()
                    .ok_or_else(|| "EXECUTE_SERVICE_URL is required for HTTP transports".to_string())?;
                let transport = HttpExecTransport::new(
                    url,
                    std::time::Duration::from_secs(5),
                    std::time::Duration::from_millis(config.session.default_limits.wall_timeout_ms),
                )
                .map_err(|e| e.to_string())?;
                (Arc::new(transport), None)
            }
        };

    let mut controller_config = ControllerConfig::new(
        config.model.root_model.clone(),
        config.model.sub_models.clone(),
        config.max_depth,
    );
    controller_config.hard_iteration_cap = config.max_iterations;
    controller_config.retry = RetryPolicy::default();

    let controller = RecursionController::new(
        backend,
        transport,
        Arc::new(TracingSink),
        controller_config,
    );
    let coordinator = TaskCoordinator::new(controller, config.coordinator.clone());
    Ok((coordinator, reaper_guard))
}
