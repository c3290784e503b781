//! Per-execution resource limits.

use serde::{Deserialize, Serialize};

/// Caps applied to a single sandbox execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecLimits {
    /// Wall-clock budget for one execution. The sandbox may overrun by at
    /// most ~500 ms (deadline checks fire between interpreter steps).
    pub wall_timeout_ms: u64,
    /// Advisory memory ceiling. Enforcement hardness depends on the
    /// deployment; the runtime always classifies allocation failures.
    pub memory_cap_bytes: u64,
    /// Each captured stream is cut at this many bytes, with a marker.
    pub output_truncate_bytes: usize,
    /// Submitted source text larger than this is rejected before execution.
    pub max_code_bytes: usize,
}

impl Default for ExecLimits {
    fn default() -> Self {
        ExecLimits {
            wall_timeout_ms: 30_000,
            memory_cap_bytes: 256 * 1024 * 1024,
            output_truncate_bytes: 64 * 1024,
            max_code_bytes: 256 * 1024,
        }
    }
}

impl ExecLimits {
    /// Copy of these limits with a different wall timeout.
    pub fn with_wall_timeout_ms(mut self, ms: u64) -> Self {
        self.wall_timeout_ms = ms;
        self
    }
}
