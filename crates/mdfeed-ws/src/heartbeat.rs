//! Heartbeat tracking for WebSocket connections.
//!
//! The heartbeat is a WebSocket ping frame whose payload is the send
//! timestamp in milliseconds. Latency is the time the send call itself took,
//! which is a round-trip proxy only; the matching pong is used to record a
//! true RTT separately.

use crate::config::HIGH_LATENCY_THRESHOLD_MS;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

/// Heartbeat state for the current session.
pub struct HeartbeatMonitor {
    /// Heartbeat interval (how often to send ping).
    interval: Duration,
    inner: RwLock<HeartbeatInner>,
}

#[derive(Debug, Default)]
struct HeartbeatInner {
    last_ping: Option<DateTime<Utc>>,
    last_pong: Option<DateTime<Utc>>,
    /// Send-time latency of the last ping.
    last_latency_ms: Option<u64>,
    /// Pong-measured round trip of the last ping.
    last_pong_rtt_ms: Option<u64>,
}

/// What the caller should do after a ping was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSample {
    pub latency_ms: u64,
    /// Latency exceeded [`HIGH_LATENCY_THRESHOLD_MS`].
    pub degraded: bool,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            inner: RwLock::new(HeartbeatInner::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Reset heartbeat state (called on connection).
    pub fn reset(&self) {
        *self.inner.write() = HeartbeatInner::default();
    }

    /// Ping frame payload for `now`.
    pub fn ping_payload(now: DateTime<Utc>) -> Vec<u8> {
        now.timestamp_millis().to_string().into_bytes()
    }

    /// Record a ping whose send call took `send_elapsed`.
    pub fn record_ping(&self, sent_at: DateTime<Utc>, send_elapsed: Duration) -> HeartbeatSample {
        let latency_ms = send_elapsed.as_millis() as u64;
        let mut inner = self.inner.write();
        inner.last_ping = Some(sent_at);
        inner.last_latency_ms = Some(latency_ms);
        debug!(latency_ms, "Recorded heartbeat ping");
        HeartbeatSample {
            latency_ms,
            degraded: latency_ms > HIGH_LATENCY_THRESHOLD_MS,
        }
    }

    /// Record a pong frame. Returns the RTT when the payload carries one of
    /// our timestamps.
    pub fn record_pong(&self, payload: &[u8]) -> Option<u64> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        inner.last_pong = Some(now);

        let sent_ms: i64 = std::str::from_utf8(payload).ok()?.parse().ok()?;
        let rtt_ms = (now.timestamp_millis() - sent_ms).max(0) as u64;
        inner.last_pong_rtt_ms = Some(rtt_ms);
        debug!(rtt_ms, "Received pong");
        Some(rtt_ms)
    }

    pub fn last_latency_ms(&self) -> Option<u64> {
        self.inner.read().last_latency_ms
    }

    pub fn last_pong_rtt_ms(&self) -> Option<u64> {
        self.inner.read().last_pong_rtt_ms
    }

    /// Get heartbeat statistics.
    pub fn stats(&self) -> HeartbeatStats {
        let inner = self.inner.read();
        HeartbeatStats {
            last_ping: inner.last_ping,
            last_pong: inner.last_pong,
            last_latency_ms: inner.last_latency_ms,
            last_pong_rtt_ms: inner.last_pong_rtt_ms,
        }
    }
}

/// Heartbeat statistics.
#[derive(Debug, Clone)]
pub struct HeartbeatStats {
    pub last_ping: Option<DateTime<Utc>>,
    pub last_pong: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<u64>,
    pub last_pong_rtt_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_initial_state() {
        let hb = HeartbeatMonitor::new(Duration::from_secs(30));
        assert_eq!(hb.last_latency_ms(), None);
        assert_eq!(hb.last_pong_rtt_ms(), None);
    }

    #[test]
    fn test_record_ping_flags_high_latency() {
        let hb = HeartbeatMonitor::new(Duration::from_secs(30));

        let fast = hb.record_ping(Utc::now(), Duration::from_millis(12));
        assert_eq!(fast.latency_ms, 12);
        assert!(!fast.degraded);

        let slow = hb.record_ping(Utc::now(), Duration::from_millis(1500));
        assert!(slow.degraded);
        assert_eq!(hb.last_latency_ms(), Some(1500));
    }

    #[test]
    fn test_latency_at_threshold_is_not_degraded() {
        let hb = HeartbeatMonitor::new(Duration::from_secs(30));
        let sample = hb.record_ping(Utc::now(), Duration::from_millis(1000));
        assert!(!sample.degraded);
    }

    #[test]
    fn test_pong_rtt_from_own_payload() {
        let hb = HeartbeatMonitor::new(Duration::from_secs(30));
        let sent = Utc::now() - chrono::Duration::milliseconds(40);
        let rtt = hb.record_pong(&HeartbeatMonitor::ping_payload(sent)).unwrap();
        assert!(rtt >= 40);
        assert_eq!(hb.last_pong_rtt_ms(), Some(rtt));
    }

    #[test]
    fn test_pong_with_foreign_payload() {
        let hb = HeartbeatMonitor::new(Duration::from_secs(30));
        assert_eq!(hb.record_pong(b"server-pong"), None);
        assert!(hb.stats().last_pong.is_some());
    }

    #[test]
    fn test_reset_clears_samples() {
        let hb = HeartbeatMonitor::new(Duration::from_secs(30));
        hb.record_ping(Utc::now(), Duration::from_millis(5));
        hb.reset();
        assert!(hb.stats().last_ping.is_none());
        assert_eq!(hb.last_latency_ms(), None);
    }
}
