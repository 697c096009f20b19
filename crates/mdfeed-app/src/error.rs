//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] mdfeed_ws::WsError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] mdfeed_binance::AdapterError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] mdfeed_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
