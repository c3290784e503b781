//! Environment-driven configuration.
//!
//! The recognized variables are a closed set (see `RlmConfig::from_env`);
//! anything unparsable is reported as a [`ConfigError`] naming the variable
//! rather than silently defaulted.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::limits::ExecLimits;

/// How the orchestrator reaches the execution plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Direct calls into an in-process session manager.
    InProcess,
    /// HTTP to a sidecar on localhost.
    Loopback,
    /// HTTP to a cluster-internal service.
    Remote,
}

impl TransportKind {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "inprocess" => Some(TransportKind::InProcess),
            "loopback" => Some(TransportKind::Loopback),
            "remote" => Some(TransportKind::Remote),
            _ => None,
        }
    }
}

/// Model provider settings.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: String,
    pub base_url: String,
    /// Depth-0 model id.
    pub root_model: String,
    /// Models for depths ≥ 1, in order; the last entry is reused for
    /// deeper levels.
    pub sub_models: Vec<String>,
    pub model_timeout: Duration,
}

/// Session manager settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_sessions: usize,
    pub idle_ttl: Duration,
    pub absolute_ttl: Duration,
    pub reap_interval: Duration,
    pub default_limits: ExecLimits,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_sessions: 64,
            idle_ttl: Duration::from_secs(600),
            absolute_ttl: Duration::from_secs(3600),
            reap_interval: Duration::from_secs(30),
            default_limits: ExecLimits::default(),
        }
    }
}

impl SessionConfig {
    /// Read only the session-related variables. Used by deployments that
    /// host the execution plane without a model credential.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = SessionConfig::default();
        let mut default_limits = defaults.default_limits;
        default_limits.wall_timeout_ms =
            parse_var("EXECUTION_TIMEOUT_MS", default_limits.wall_timeout_ms)?;
        Ok(SessionConfig {
            max_sessions: parse_var("MAX_SESSIONS", defaults.max_sessions)?,
            idle_ttl: Duration::from_millis(parse_var("SESSION_IDLE_TTL_MS", 600_000u64)?),
            absolute_ttl: Duration::from_millis(parse_var("SESSION_ABSOLUTE_TTL_MS", 3_600_000u64)?),
            reap_interval: defaults.reap_interval,
            default_limits,
        })
    }
}

/// Task coordinator settings.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Global cap on in-flight tasks, counting each recursion tree once.
    pub concurrency: usize,
    /// Number of reasoning workers pulling from the queue.
    pub worker_pool_size: usize,
    /// Queue bound; `submit` suspends when the queue is full.
    pub queue_depth: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            concurrency: 5,
            worker_pool_size: 3,
            queue_depth: 256,
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone)]
pub struct RlmConfig {
    pub model: ModelConfig,
    pub session: SessionConfig,
    pub coordinator: CoordinatorConfig,
    pub transport: TransportKind,
    /// Base URL of the execution service, for the loopback/remote bindings.
    pub execute_service_url: Option<String>,
    pub max_depth: u32,
    pub max_iterations: u32,
}

impl RlmConfig {
    /// Read configuration from the process environment.
    ///
    /// Recognized variables: `MODEL_API_KEY` (required), `MODEL_BASE_URL`,
    /// `MODEL_ROOT`, `MODEL_SUB_LIST`, `MAX_DEPTH`, `MAX_ITERATIONS`,
    /// `EXECUTION_TIMEOUT_MS`, `EXECUTE_TRANSPORT`, `EXECUTE_SERVICE_URL`,
    /// `CONCURRENCY`, `WORKER_POOL_SIZE`, `SESSION_IDLE_TTL_MS`,
    /// `SESSION_ABSOLUTE_TTL_MS`, `MAX_SESSIONS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = env::var("MODEL_API_KEY").map_err(|_| ConfigError::Missing("MODEL_API_KEY"))?;

        let base_url =
            env::var("MODEL_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let root_model = env::var("MODEL_ROOT").unwrap_or_else(|_| "gpt-5".to_string());
        let sub_models = match env::var("MODEL_SUB_LIST") {
            Ok(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => Vec::new(),
        };

        let max_depth = parse_var("MAX_DEPTH", 1u32)?;
        if max_depth < 1 {
            return Err(ConfigError::Invalid {
                name: "MAX_DEPTH",
                value: max_depth.to_string(),
                reason: "must be at least 1".into(),
            });
        }
        let max_iterations = parse_var("MAX_ITERATIONS", 20u32)?;

        let transport = match env::var("EXECUTE_TRANSPORT") {
            Ok(raw) => TransportKind::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                name: "EXECUTE_TRANSPORT",
                value: raw,
                reason: "expected one of inprocess|loopback|remote".into(),
            })?,
            Err(_) => TransportKind::InProcess,
        };
        let execute_service_url = env::var("EXECUTE_SERVICE_URL").ok();
        if transport != TransportKind::InProcess && execute_service_url.is_none() {
            return Err(ConfigError::Missing("EXECUTE_SERVICE_URL"));
        }

        let session = SessionConfig::from_env()?;

        let coordinator = CoordinatorConfig {
            concurrency: parse_var("CONCURRENCY", CoordinatorConfig::default().concurrency)?,
            worker_pool_size: parse_var("WORKER_POOL_SIZE", CoordinatorConfig::default().worker_pool_size)?,
            queue_depth: CoordinatorConfig::default().queue_depth,
        };

        Ok(RlmConfig {
            model: ModelConfig {
                api_key,
                base_url,
                root_model,
                sub_models,
                model_timeout: Duration::from_millis(120_000),
            },
            session,
            coordinator,
            transport,
            execute_service_url,
            max_depth,
            max_iterations,
        })
    }
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kind_parses_known_names() {
        assert_eq!(TransportKind::parse("inprocess"), Some(TransportKind::InProcess));
        assert_eq!(TransportKind::parse("loopback"), Some(TransportKind::Loopback));
        assert_eq!(TransportKind::parse("remote"), Some(TransportKind::Remote));
        assert_eq!(TransportKind::parse("carrier-pigeon"), None);
    }
}
