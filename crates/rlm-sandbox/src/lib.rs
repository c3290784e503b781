//! # RLM Sandbox
//!
//! The execution plane: a per-session embedded Python interpreter with
//! captured output and a wall-clock deadline, a session manager owning the
//! table of live interpreters, and a background reaper enforcing idle and
//! absolute TTLs.
//!
//! Each session's interpreter lives on its own OS thread (the VM is not
//! `Send`) and is driven over a command channel; the session manager
//! serializes executions per session behind an async gate while letting
//! distinct sessions run fully concurrently.

mod interpreter;
mod manager;
mod reaper;
mod session;
mod worker;

pub use manager::SessionManager;
pub use reaper::spawn_reaper;
pub use session::SessionInfo;
pub use worker::SandboxHandle;

pub use rlm_core::config::SessionConfig;
