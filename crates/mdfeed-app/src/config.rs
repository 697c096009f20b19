//! Application configuration.

use crate::error::{AppError, AppResult};
use mdfeed_binance::{raw_stream_url, AdapterConfig, StreamKind, FUTURES_STREAM_BASE};
use mdfeed_ws::ConnectionConfig;
use serde::Deserialize;
use std::net::SocketAddr;

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Symbols to subscribe, e.g. `["BTCUSDT", "ETHUSDT"]`.
    pub symbols: Vec<String>,
    /// Streams subscribed for every symbol.
    #[serde(default = "default_streams")]
    pub streams: Vec<StreamKind>,
    /// Exchange stream base; the raw `/ws` endpoint is derived from it
    /// unless `connection.url` is set explicitly.
    #[serde(default = "default_stream_base_url")]
    pub stream_base_url: String,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub adapter: AdapterConfig,
    /// Serve Prometheus metrics on this address when set.
    #[serde(default)]
    pub metrics_addr: Option<SocketAddr>,
}

fn default_streams() -> Vec<StreamKind> {
    vec![StreamKind::Trade, StreamKind::BookTicker]
}

fn default_stream_base_url() -> String {
    FUTURES_STREAM_BASE.to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.symbols.iter().all(|s| s.trim().is_empty()) {
            return Err(AppError::Config("at least one symbol is required".into()));
        }
        if self.streams.is_empty() {
            return Err(AppError::Config("at least one stream is required".into()));
        }
        Ok(())
    }

    /// Connection settings with the endpoint filled in.
    pub fn connection_config(&self) -> ConnectionConfig {
        let mut connection = self.connection.clone();
        if connection.url.is_empty() {
            connection.url = raw_stream_url(&self.stream_base_url);
        }
        connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_toml(r#"symbols = ["BTCUSDT"]"#).unwrap();
        assert_eq!(config.streams, vec![StreamKind::Trade, StreamKind::BookTicker]);
        assert_eq!(config.metrics_addr, None);
        assert_eq!(config.connection.max_reconnect_attempts, 5);
        assert_eq!(
            config.connection_config().url,
            "wss://fstream.binance.com/ws"
        );
    }

    #[test]
    fn test_full_config() {
        let config = AppConfig::from_toml(
            r#"
            symbols = ["btcusdt", "ethusdt"]
            streams = ["depth", "ticker"]
            stream_base_url = "wss://stream.binance.com:9443"
            metrics_addr = "127.0.0.1:9100"

            [connection]
            url = "ws://localhost:8080/ws"
            heartbeat_interval_ms = 5000
            max_connection_lifetime_ms = 60000

            [adapter]
            reconnect_poll_attempts = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.streams, vec![StreamKind::Depth, StreamKind::Ticker]);
        assert_eq!(config.connection_config().url, "ws://localhost:8080/ws");
        assert_eq!(config.connection.heartbeat_interval_ms, 5000);
        assert_eq!(config.connection.max_connection_lifetime_ms, Some(60_000));
        assert_eq!(config.adapter.reconnect_poll_attempts, 10);
        assert_eq!(config.metrics_addr, Some("127.0.0.1:9100".parse().unwrap()));
    }

    #[test]
    fn test_unknown_stream_kind_fails_fast() {
        let err = AppConfig::from_toml(
            r#"
            symbols = ["btcusdt"]
            streams = ["kline_1m"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_empty_symbols_rejected() {
        assert!(AppConfig::from_toml("symbols = []").is_err());
    }
}
