//! Prometheus metrics for the market-data client.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`: a failure means duplicate metric
//! names, which is a startup bug. It only happens during lazy static
//! initialization.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram, CounterVec,
    Encoder, Gauge, GaugeVec, Histogram, TextEncoder,
};

/// Connection state names, in the order used for the state gauge.
pub const CONNECTION_STATES: [&str; 5] =
    ["disconnected", "connecting", "connected", "reconnecting", "error"];

/// WebSocket connection state (1 = connected, 0 = otherwise).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "mdfeed_ws_connected",
        "WebSocket connection state (1=connected)"
    )
    .unwrap()
});

/// Labels: state (see [`CONNECTION_STATES`]).
pub static WS_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "mdfeed_ws_state",
        "Connection state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mdfeed_ws_reconnect_total",
        "Total reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Labels: kind (market event kind).
pub static MESSAGES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mdfeed_messages_total",
        "Market events delivered, by kind",
        &["kind"]
    )
    .unwrap()
});

/// Labels: reason (backpressure).
pub static DROPPED_MESSAGES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mdfeed_dropped_messages_total",
        "Messages dropped or evicted, by reason",
        &["reason"]
    )
    .unwrap()
});

pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mdfeed_errors_total",
        "Error events, by category",
        &["category"]
    )
    .unwrap()
});

pub static HEARTBEAT_LATENCY_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "mdfeed_heartbeat_latency_ms",
        "Heartbeat send latency in milliseconds",
        vec![0.5, 1.0, 2.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

pub static PONG_RTT_MS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "mdfeed_pong_rtt_ms",
        "Most recent ping/pong round trip in milliseconds"
    )
    .unwrap()
});

pub static MESSAGES_PER_SECOND: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "mdfeed_messages_per_second",
        "Inbound messages in the last rate window"
    )
    .unwrap()
});

pub static MEMORY_USAGE_BYTES: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "mdfeed_memory_usage_bytes",
        "Estimated bytes held by connection buffers and queues"
    )
    .unwrap()
});

/// Labels: outcome (confirmed, rejected).
pub static SUBSCRIPTION_ACKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mdfeed_subscription_acks_total",
        "Subscription acknowledgements, by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Metrics helper.
pub struct Metrics;

impl Metrics {
    /// Set the active connection state. All other states go to 0.
    pub fn ws_state_set(state: &str) {
        for s in CONNECTION_STATES {
            WS_STATE.with_label_values(&[s]).set(0.0);
        }
        WS_STATE.with_label_values(&[state]).set(1.0);
        WS_CONNECTED.set(if state == "connected" { 1.0 } else { 0.0 });
    }

    pub fn ws_reconnect(reason: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn message(kind: &str) {
        MESSAGES_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn dropped(reason: &str, count: u64) {
        DROPPED_MESSAGES_TOTAL
            .with_label_values(&[reason])
            .inc_by(count as f64);
    }

    pub fn error(category: &str) {
        ERRORS_TOTAL.with_label_values(&[category]).inc();
    }

    pub fn heartbeat_latency(latency_ms: u64) {
        HEARTBEAT_LATENCY_MS.observe(latency_ms as f64);
    }

    /// Record the periodic performance snapshot.
    pub fn performance(messages_per_second: f64, memory_usage_bytes: u64, pong_rtt_ms: Option<u64>) {
        MESSAGES_PER_SECOND.set(messages_per_second);
        MEMORY_USAGE_BYTES.set(memory_usage_bytes as f64);
        if let Some(rtt) = pong_rtt_ms {
            PONG_RTT_MS.set(rtt as f64);
        }
    }

    pub fn subscription_ack(confirmed: bool) {
        let outcome = if confirmed { "confirmed" } else { "rejected" };
        SUBSCRIPTION_ACKS_TOTAL.with_label_values(&[outcome]).inc();
    }
}

/// Render the default registry in the Prometheus text format.
pub fn gather_text() -> TelemetryResult<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_gauge_has_single_active_state() {
        Metrics::ws_state_set("reconnecting");
        Metrics::ws_state_set("connected");

        let active: Vec<_> = CONNECTION_STATES
            .iter()
            .filter(|s| WS_STATE.with_label_values(&[**s]).get() == 1.0)
            .collect();
        assert_eq!(active, vec![&"connected"]);
        assert_eq!(WS_CONNECTED.get(), 1.0);

        Metrics::ws_state_set("error");
        assert_eq!(WS_CONNECTED.get(), 0.0);
    }

    #[test]
    fn test_counters_accumulate() {
        let before = MESSAGES_TOTAL.with_label_values(&["test_kind"]).get();
        Metrics::message("test_kind");
        Metrics::message("test_kind");
        assert_eq!(MESSAGES_TOTAL.with_label_values(&["test_kind"]).get(), before + 2.0);

        let before = DROPPED_MESSAGES_TOTAL.with_label_values(&["test_reason"]).get();
        Metrics::dropped("test_reason", 5);
        assert_eq!(
            DROPPED_MESSAGES_TOTAL.with_label_values(&["test_reason"]).get(),
            before + 5.0
        );
    }

    #[test]
    fn test_gather_text_contains_registered_metrics() {
        Metrics::subscription_ack(true);
        Metrics::heartbeat_latency(3);
        let text = gather_text().unwrap();
        assert!(text.contains("mdfeed_subscription_acks_total"));
        assert!(text.contains("mdfeed_heartbeat_latency_ms_bucket"));
    }
}
