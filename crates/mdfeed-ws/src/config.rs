//! Connection configuration.

use serde::Deserialize;
use std::time::Duration;

/// Upper bound on any single reconnect delay.
pub const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

/// Heartbeat latency above which a quality warning is raised.
pub const HIGH_LATENCY_THRESHOLD_MS: u64 = 1_000;

/// Connection configuration.
///
/// Resolved once when the manager is built and never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    #[serde(default)]
    pub url: String,
    /// Base delay for exponential backoff.
    #[serde(default = "default_reconnect_base_interval_ms")]
    pub reconnect_base_interval_ms: u64,
    /// Reconnect attempts before giving up and entering `Error`.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Heartbeat interval while connected.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Capacity of the outbound queue used while disconnected.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    /// How long a single connection attempt may take.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Keep a ring of recent inbound messages for recovery queries.
    #[serde(default = "default_true")]
    pub enable_buffering: bool,
    /// Capacity of the inbound ring.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Gate inbound acceptance through the processing queue.
    #[serde(default = "default_true")]
    pub enable_backpressure: bool,
    /// Processing queue length at which inbound messages start being dropped.
    #[serde(default = "default_backpressure_threshold")]
    pub backpressure_threshold: usize,
    /// Pacing of the processing queue drain (one entry per tick).
    #[serde(default = "default_backpressure_drain_interval_ms")]
    pub backpressure_drain_interval_ms: u64,
    /// Proactive reconnect after this much session time. `None` disables it.
    #[serde(default = "default_max_connection_lifetime_ms")]
    pub max_connection_lifetime_ms: Option<u64>,
}

fn default_reconnect_base_interval_ms() -> u64 {
    1_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_max_queue_size() -> usize {
    100
}

fn default_connection_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_buffer_size() -> usize {
    1_000
}

fn default_backpressure_threshold() -> usize {
    1_000
}

fn default_backpressure_drain_interval_ms() -> u64 {
    1
}

fn default_max_connection_lifetime_ms() -> Option<u64> {
    // Binance terminates sessions at 24h; roll over an hour early.
    Some(23 * 60 * 60 * 1_000)
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect_base_interval_ms: default_reconnect_base_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            max_queue_size: default_max_queue_size(),
            connection_timeout_ms: default_connection_timeout_ms(),
            enable_buffering: true,
            buffer_size: default_buffer_size(),
            enable_backpressure: true,
            backpressure_threshold: default_backpressure_threshold(),
            backpressure_drain_interval_ms: default_backpressure_drain_interval_ms(),
            max_connection_lifetime_ms: default_max_connection_lifetime_ms(),
        }
    }
}

impl ConnectionConfig {
    /// Config for `url` with every other field at its default.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Delay before reconnect attempt `attempt` (1-indexed).
    ///
    /// `min(base * 2^(attempt-1), 30000ms)`.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        reconnect_delay(self.reconnect_base_interval_ms, attempt)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.backpressure_drain_interval_ms.max(1))
    }

    pub fn max_connection_lifetime(&self) -> Option<Duration> {
        self.max_connection_lifetime_ms.map(Duration::from_millis)
    }
}

/// Exponential backoff capped at [`MAX_RECONNECT_DELAY_MS`].
pub fn reconnect_delay(base_ms: u64, attempt: u32) -> Duration {
    // attempt=1 -> base, attempt=2 -> 2*base, attempt=3 -> 4*base
    let exponent = attempt.saturating_sub(1).min(32);
    let delay = base_ms.saturating_mul(1u64 << exponent);
    Duration::from_millis(delay.min(MAX_RECONNECT_DELAY_MS))
}
