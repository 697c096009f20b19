//! Per-connection performance counters.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Length of the messages-per-second window.
pub const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Read-only snapshot of the counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    /// Rate over the last completed one-second window.
    pub messages_per_second: f64,
    /// Send-time heartbeat latency of the last ping.
    pub latency_ms: Option<u64>,
    /// Pong-measured round trip of the last ping.
    pub last_pong_rtt_ms: Option<u64>,
    /// Approximate bytes held in the inbound buffer and outbound queue.
    pub memory_usage_bytes: usize,
    /// Time since the last successful connect; zero while not connected.
    pub uptime_ms: u64,
    pub total_messages: u64,
    pub total_bytes_received: u64,
    pub error_count: u64,
    /// Inbound messages dropped by backpressure.
    pub dropped_messages: u64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Mutable counters owned by the connection manager.
///
/// Survives reconnects; only [`MetricsTracker::reset`] clears it.
#[derive(Debug)]
pub struct MetricsTracker {
    snapshot: PerformanceMetrics,
    window_start: Instant,
    window_count: u64,
    connected_at: Option<Instant>,
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self {
            snapshot: PerformanceMetrics::default(),
            window_start: Instant::now(),
            window_count: 0,
            connected_at: None,
        }
    }

    /// Count one inbound message of `bytes` length.
    pub fn record_message(&mut self, bytes: usize, at: DateTime<Utc>) {
        self.snapshot.total_messages += 1;
        self.snapshot.total_bytes_received += bytes as u64;
        self.snapshot.last_message_at = Some(at);
        self.window_count += 1;
    }

    /// Close the rate window if it has elapsed as of `now`.
    ///
    /// Returns `true` when the rate was recomputed.
    pub fn roll_window(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < RATE_WINDOW {
            return false;
        }
        self.snapshot.messages_per_second = self.window_count as f64 / elapsed.as_secs_f64();
        self.window_count = 0;
        self.window_start = now;
        true
    }

    pub fn record_error(&mut self, description: impl Into<String>) {
        self.snapshot.error_count += 1;
        self.snapshot.last_error = Some(description.into());
    }

    pub fn record_dropped(&mut self) {
        self.snapshot.dropped_messages += 1;
    }

    pub fn record_latency(&mut self, latency_ms: u64) {
        self.snapshot.latency_ms = Some(latency_ms);
    }

    pub fn record_pong_rtt(&mut self, rtt_ms: u64) {
        self.snapshot.last_pong_rtt_ms = Some(rtt_ms);
    }

    pub fn mark_connected(&mut self) {
        self.connected_at = Some(Instant::now());
    }

    pub fn mark_disconnected(&mut self) {
        self.connected_at = None;
    }

    pub fn set_memory_usage(&mut self, bytes: usize) {
        self.snapshot.memory_usage_bytes = bytes;
    }

    /// Snapshot with uptime computed as of now.
    pub fn snapshot(&self) -> PerformanceMetrics {
        let mut snapshot = self.snapshot.clone();
        snapshot.uptime_ms = self
            .connected_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        snapshot
    }

    /// Clear every counter. Connection uptime is kept if connected.
    pub fn reset(&mut self) {
        let connected_at = self.connected_at;
        *self = Self::new();
        self.connected_at = connected_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_message_updates_totals() {
        let mut metrics = MetricsTracker::new();
        let now = Utc::now();
        metrics.record_message(10, now);
        metrics.record_message(5, now);

        let snap = metrics.snapshot();
        assert_eq!(snap.total_messages, 2);
        assert_eq!(snap.total_bytes_received, 15);
        assert_eq!(snap.last_message_at, Some(now));
    }

    #[test]
    fn test_rate_window_rolls_after_one_second() {
        let mut metrics = MetricsTracker::new();
        let start = metrics.window_start;
        for _ in 0..50 {
            metrics.window_count += 1;
        }
        assert!(!metrics.roll_window(start + Duration::from_millis(500)));
        assert!(metrics.roll_window(start + Duration::from_secs(2)));
        assert!((metrics.snapshot().messages_per_second - 25.0).abs() < f64::EPSILON);
        assert_eq!(metrics.window_count, 0);
    }

    #[test]
    fn test_uptime_zero_when_disconnected() {
        let mut metrics = MetricsTracker::new();
        assert_eq!(metrics.snapshot().uptime_ms, 0);
        metrics.mark_connected();
        metrics.mark_disconnected();
        assert_eq!(metrics.snapshot().uptime_ms, 0);
    }

    #[test]
    fn test_reset_clears_counters() {
        let mut metrics = MetricsTracker::new();
        metrics.record_message(1, Utc::now());
        metrics.record_error("boom");
        metrics.record_dropped();
        metrics.reset();

        let snap = metrics.snapshot();
        assert_eq!(snap.total_messages, 0);
        assert_eq!(snap.error_count, 0);
        assert_eq!(snap.dropped_messages, 0);
        assert!(snap.last_error.is_none());
    }
}
