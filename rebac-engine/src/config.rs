use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Evaluation limits for the engine.
///
/// Deserializes with every field optional, so a partial JSON document
/// overrides only what it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Recursion depth at which a check aborts with a depth error
    /// instead of descending further.
    pub max_depth: u32,

    /// Wall-clock budget for one check request, in milliseconds.
    pub check_timeout_ms: u64,

    /// Depth at which expansion trees truncate. Expansion marks the
    /// node truncated rather than failing the request.
    pub expand_max_depth: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 100,
            check_timeout_ms: 5_000,
            expand_max_depth: 25,
        }
    }
}

impl EngineConfig {
    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_expand_max_depth(mut self, max_depth: u32) -> Self {
        self.expand_max_depth = max_depth;
        self
    }
}
