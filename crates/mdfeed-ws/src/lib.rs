//! WebSocket connection manager for market-data streams.
//!
//! Protocol-agnostic socket supervision:
//! - Connection state machine with connect timeout
//! - Automatic reconnection with capped exponential backoff and manual retry
//! - Heartbeat latency probe
//! - Outbound queueing while disconnected, flushed FIFO on connect
//! - Inbound ring buffer for post-reconnect recovery
//! - Backpressure gate protecting downstream consumers
//! - Per-kind event registry for status, messages, errors and metrics

pub mod backpressure;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod message;
pub mod metrics;

pub use config::{reconnect_delay, ConnectionConfig, MAX_RECONNECT_DELAY_MS};
pub use connection::{ConnectionInfo, ConnectionManager, ConnectionState};
pub use error::{ErrorCategory, WsError, WsResult};
pub use events::{
    ConnectionEvent, ConnectionEventKind, ConnectionWarning, ErrorEvent, Event, EventEmitter,
    ListenerId,
};
pub use heartbeat::HeartbeatStats;
pub use message::{InboundMessage, OutboundPayload, Payload, SendOutcome};
pub use metrics::PerformanceMetrics;

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
