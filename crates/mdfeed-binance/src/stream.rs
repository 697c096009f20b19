//! Stream kinds, stream names and endpoint URLs.

use crate::error::AdapterError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// USDⓈ-M futures market streams.
pub const FUTURES_STREAM_BASE: &str = "wss://fstream.binance.com";

/// Spot market streams.
pub const SPOT_STREAM_BASE: &str = "wss://stream.binance.com:9443";

/// Subscribable stream type for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamKind {
    Depth,
    Trade,
    Ticker,
    BookTicker,
}

impl StreamKind {
    pub const ALL: [StreamKind; 4] = [Self::Depth, Self::Trade, Self::Ticker, Self::BookTicker];

    /// Suffix after `@` in the stream name.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Depth => "depth",
            Self::Trade => "trade",
            Self::Ticker => "ticker",
            Self::BookTicker => "bookTicker",
        }
    }

    /// Stream name for `symbol`, e.g. `btcusdt@depth`.
    pub fn stream_name(&self, symbol: &str) -> String {
        format!("{}@{}", normalize_symbol(symbol), self.suffix())
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for StreamKind {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.suffix() == s)
            .ok_or_else(|| AdapterError::UnknownStreamKind(s.to_string()))
    }
}

/// Subscriptions are keyed by the lower-cased symbol.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_lowercase()
}

/// Stream names for `symbol`, one per kind, in request order.
pub fn stream_names(symbol: &str, streams: &[StreamKind]) -> Vec<String> {
    streams.iter().map(|kind| kind.stream_name(symbol)).collect()
}

/// Drop repeated kinds, keeping first occurrence order.
pub(crate) fn dedup_streams(streams: &[StreamKind]) -> Vec<StreamKind> {
    let mut out = Vec::with_capacity(streams.len());
    for kind in streams {
        if !out.contains(kind) {
            out.push(*kind);
        }
    }
    out
}

/// Combined-stream endpoint: `<base>/stream?streams=a/b/c`.
///
/// Messages on this endpoint arrive wrapped as `{"stream": .., "data": ..}`.
pub fn combined_stream_url(base: &str, streams: &[String]) -> String {
    format!("{}/stream?streams={}", base.trim_end_matches('/'), streams.join("/"))
}

/// Raw endpoint for live SUBSCRIBE/UNSUBSCRIBE: `<base>/ws`.
pub fn raw_stream_url(base: &str) -> String {
    format!("{}/ws", base.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_names_follow_fixed_mapping() {
        let names = stream_names("BTCUSDT", &StreamKind::ALL);
        assert_eq!(
            names,
            vec![
                "btcusdt@depth",
                "btcusdt@trade",
                "btcusdt@ticker",
                "btcusdt@bookTicker"
            ]
        );
    }

    #[test]
    fn test_parse_known_and_unknown_kinds() {
        assert_eq!("bookTicker".parse::<StreamKind>().unwrap(), StreamKind::BookTicker);
        assert!(matches!(
            "kline_1m".parse::<StreamKind>(),
            Err(AdapterError::UnknownStreamKind(s)) if s == "kline_1m"
        ));
    }

    #[test]
    fn test_serde_names_match_suffixes() {
        let kinds: Vec<StreamKind> =
            serde_json::from_str(r#"["depth", "trade", "ticker", "bookTicker"]"#).unwrap();
        assert_eq!(kinds, StreamKind::ALL.to_vec());
        assert!(serde_json::from_str::<StreamKind>(r#""aggTrade""#).is_err());
    }

    #[test]
    fn test_dedup_keeps_first_order() {
        let kinds = dedup_streams(&[StreamKind::Trade, StreamKind::Depth, StreamKind::Trade]);
        assert_eq!(kinds, vec![StreamKind::Trade, StreamKind::Depth]);
    }

    #[test]
    fn test_urls() {
        let streams = stream_names("ethusdt", &[StreamKind::Depth, StreamKind::Trade]);
        assert_eq!(
            combined_stream_url(FUTURES_STREAM_BASE, &streams),
            "wss://fstream.binance.com/stream?streams=ethusdt@depth/ethusdt@trade"
        );
        assert_eq!(raw_stream_url("wss://fstream.binance.com/"), "wss://fstream.binance.com/ws");
    }
}
