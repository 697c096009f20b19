//! Adapter error types.

use mdfeed_ws::{SendOutcome, WsError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Not connected")]
    NotConnected,

    #[error("Unknown stream kind: {0}")]
    UnknownStreamKind(String),

    #[error("Subscription request has no symbols or streams")]
    EmptyRequest,

    #[error("Symbol not subscribed: {0}")]
    NotSubscribed(String),

    #[error("Request not sent: {0:?}")]
    SendFailed(SendOutcome),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid number in field {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Reconnect did not complete after {0} polls")]
    ReconnectTimeout(u32),

    #[error("Adapter has been destroyed")]
    Destroyed,

    #[error("WebSocket error: {0}")]
    Ws(#[from] WsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AdapterResult<T> = Result<T, AdapterError>;
