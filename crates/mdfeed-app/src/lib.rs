//! Market-data feed client.
//!
//! Wires the Binance adapter to telemetry:
//! - Loads TOML configuration
//! - Subscribes configured symbols on every (re)connect
//! - Exports connection and market-event metrics to Prometheus

pub mod app;
pub mod config;
pub mod error;
pub mod metrics_server;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
