//! Per-client burst limiting (`[rate_limit]` section)

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sliding-window burst limit keyed by client address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRateLimitConfig {
    /// Requests allowed per window; 0 disables limiting
    pub burst: usize,
    pub window_seconds: u64,
}

impl Default for FileRateLimitConfig {
    fn default() -> Self {
        Self {
            burst: 10,
            window_seconds: 10,
        }
    }
}

impl FileRateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}
