//! Binance market-data protocol adapter.
//!
//! Layers the Binance stream protocol over `mdfeed-ws`:
//! - Stream naming and combined/raw endpoint URLs
//! - SUBSCRIBE/UNSUBSCRIBE requests correlated with acks by id
//! - Per-symbol subscription tracking with resubscribe on reconnect
//! - Classification of depth, trade, ticker and book-ticker payloads
//! - Decimal normalization of trades and depth levels

pub mod adapter;
pub mod config;
pub mod error;
pub mod events;
pub mod message;
pub mod stream;

pub use adapter::{BinanceAdapter, PendingRequest};
pub use config::AdapterConfig;
pub use error::{AdapterError, AdapterResult};
pub use events::{Level, MarketEvent, MarketEventKind, NormalizedTrade, ProcessedDepth};
pub use message::{
    classify, BookTicker, DepthUpdate, RawTrade, StreamMessage, SubscriptionAck,
    SubscriptionMethod, SubscriptionRequest, Ticker24h,
};
pub use stream::{
    combined_stream_url, normalize_symbol, raw_stream_url, stream_names, StreamKind,
    FUTURES_STREAM_BASE, SPOT_STREAM_BASE,
};
