//! WebSocket error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection attempt timed out after {0}ms")]
    Timeout(u64),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Manual retry unavailable in state {0}")]
    RetryUnavailable(String),

    #[error("Connection manager has been destroyed")]
    Destroyed,

    #[error("No async runtime available: {0}")]
    Runtime(String),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WsError {
    /// Category reported on `Error` events.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_)
            | Self::ConnectionClosed { .. }
            | Self::SendFailed(_)
            | Self::Tungstenite(_) => ErrorCategory::Transport,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Json(_) => ErrorCategory::Protocol,
            Self::RetryUnavailable(_) | Self::Destroyed | Self::Runtime(_) => {
                ErrorCategory::Usage
            }
        }
    }
}

/// Coarse error taxonomy carried by error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Socket open/send/receive failure.
    Transport,
    /// Connection attempt exceeded the configured timeout.
    Timeout,
    /// Malformed or unclassifiable payload.
    Protocol,
    /// API misuse (retry while not exhausted, call after destroy).
    Usage,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Protocol => "protocol",
            Self::Usage => "usage",
        }
    }
}

pub type WsResult<T> = Result<T, WsError>;
