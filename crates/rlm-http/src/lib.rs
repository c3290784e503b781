//! # RLM HTTP
//!
//! The two service surfaces of the runtime:
//!
//! - the **execution plane** (`exec_service`): session create/execute/
//!   destroy plus health, readiness, and session listing — the API the
//!   loopback and remote transports speak;
//! - the **inference surface** (`infer_service`): `POST /infer`, running a
//!   whole reasoning tree per request.
//!
//! Both are plain axum routers so deployments can serve them standalone
//! or merged, with graceful shutdown on SIGTERM/SIGINT.

pub mod exec_service;
pub mod infer_service;
pub mod shutdown;

pub use exec_service::{exec_router, ExecServiceState};
pub use infer_service::{infer_router, InferServiceState};
pub use shutdown::shutdown_signal;
