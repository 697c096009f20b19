//! Prometheus metrics and structured logging for mdfeed.
//!
//! - Prometheus metrics for connection state, message flow and subscriptions
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::{gather_text, Metrics};
