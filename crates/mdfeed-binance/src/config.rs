//! Adapter configuration.

use serde::Deserialize;
use std::time::Duration;

/// Adapter settings layered over the connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    /// Poll interval while waiting for `Connected` during a resubscribing reconnect.
    #[serde(default = "default_reconnect_poll_interval_ms")]
    pub reconnect_poll_interval_ms: u64,
    /// Polls before a resubscribing reconnect gives up.
    #[serde(default = "default_reconnect_poll_attempts")]
    pub reconnect_poll_attempts: u32,
}

fn default_reconnect_poll_interval_ms() -> u64 {
    100
}

fn default_reconnect_poll_attempts() -> u32 {
    100
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            reconnect_poll_interval_ms: default_reconnect_poll_interval_ms(),
            reconnect_poll_attempts: default_reconnect_poll_attempts(),
        }
    }
}

impl AdapterConfig {
    pub fn reconnect_poll_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_poll_interval_ms)
    }
}
