//! Binance stream wire types and message classification.
//!
//! Inbound frames are classified in a fixed order:
//! 1. Object with a numeric `id`: subscription acknowledgement
//! 2. Object with `stream` and `data`: combined-stream envelope, `data` is
//!    classified recursively
//! 3. Object with an `e` tag: depth, trade, 24h ticker or book ticker
//! 4. Object carrying `u`, `s`, `b`, `B`, `a`, `A` without a tag: book ticker
//!
//! Anything else is unrecognized and ignored by the adapter.
//!
//! Note: Binance sends prices and quantities as strings.

use crate::error::{AdapterError, AdapterResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `[price, quantity]` as sent on the wire.
pub type PriceLevel = [String; 2];

/// Diff depth update (`e = "depthUpdate"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthUpdate {
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Transaction time (futures only).
    #[serde(rename = "T", default)]
    pub transaction_time: Option<i64>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub final_update_id: u64,
    /// Previous final update id (futures only).
    #[serde(rename = "pu", default)]
    pub prev_final_update_id: Option<u64>,
    #[serde(rename = "b")]
    pub bids: Vec<PriceLevel>,
    #[serde(rename = "a")]
    pub asks: Vec<PriceLevel>,
}

/// Raw trade (`e = "trade"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTrade {
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "t")]
    pub trade_id: u64,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "T")]
    pub trade_time: i64,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

/// Rolling 24h ticker (`e = "24hrTicker"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker24h {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price_change: String,
    #[serde(rename = "P")]
    pub price_change_percent: String,
    #[serde(rename = "w")]
    pub weighted_avg_price: String,
    #[serde(rename = "c")]
    pub last_price: String,
    #[serde(rename = "Q")]
    pub last_quantity: String,
    #[serde(rename = "o")]
    pub open_price: String,
    #[serde(rename = "h")]
    pub high_price: String,
    #[serde(rename = "l")]
    pub low_price: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "q")]
    pub quote_volume: String,
    #[serde(rename = "O")]
    pub open_time: i64,
    #[serde(rename = "C")]
    pub close_time: i64,
    #[serde(rename = "F")]
    pub first_trade_id: i64,
    #[serde(rename = "L")]
    pub last_trade_id: i64,
    #[serde(rename = "n")]
    pub trade_count: u64,
}

/// Best bid/ask update.
///
/// Spot sends it untagged; futures adds `e = "bookTicker"` plus event and
/// transaction times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookTicker {
    #[serde(rename = "u")]
    pub update_id: u64,
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
    #[serde(rename = "T", default)]
    pub transaction_time: Option<i64>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b")]
    pub bid_price: String,
    #[serde(rename = "B")]
    pub bid_quantity: String,
    #[serde(rename = "a")]
    pub ask_price: String,
    #[serde(rename = "A")]
    pub ask_quantity: String,
}

/// Response to a SUBSCRIBE/UNSUBSCRIBE request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscriptionAck {
    pub id: u64,
    #[serde(default)]
    pub result: Value,
    /// `null` is treated the same as absent.
    #[serde(default)]
    pub error: Option<Value>,
}

impl SubscriptionAck {
    pub fn is_success(&self) -> bool {
        self.error.as_ref().map_or(true, Value::is_null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionMethod {
    Subscribe,
    Unsubscribe,
}

/// Outbound `{"method": .., "params": [..], "id": n}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub method: SubscriptionMethod,
    pub params: Vec<String>,
    pub id: u64,
}

impl SubscriptionRequest {
    pub fn subscribe(params: Vec<String>, id: u64) -> Self {
        Self {
            method: SubscriptionMethod::Subscribe,
            params,
            id,
        }
    }

    pub fn unsubscribe(params: Vec<String>, id: u64) -> Self {
        Self {
            method: SubscriptionMethod::Unsubscribe,
            params,
            id,
        }
    }
}

/// Result of classifying one inbound JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    SubscriptionAck(SubscriptionAck),
    Envelope {
        stream: String,
        data: Box<StreamMessage>,
    },
    Depth(DepthUpdate),
    Trade(RawTrade),
    Ticker(Ticker24h),
    BookTicker(BookTicker),
    Unrecognized,
}

const BOOK_TICKER_FIELDS: [&str; 6] = ["u", "s", "b", "B", "a", "A"];

/// Classify an inbound JSON value.
///
/// Returns an error when the value matches a known shape but fails to decode.
pub fn classify(value: &Value) -> AdapterResult<StreamMessage> {
    let Some(obj) = value.as_object() else {
        return Ok(StreamMessage::Unrecognized);
    };

    if let Some(id) = obj.get("id").filter(|id| id.is_number()) {
        // Request ids are u64; any other number cannot match a pending entry.
        if !id.is_u64() {
            return Ok(StreamMessage::Unrecognized);
        }
        return decode(value, "subscription ack").map(StreamMessage::SubscriptionAck);
    }

    if let (Some(stream), Some(data)) = (obj.get("stream"), obj.get("data")) {
        let stream = stream
            .as_str()
            .ok_or_else(|| AdapterError::Protocol("envelope stream is not a string".into()))?;
        return Ok(StreamMessage::Envelope {
            stream: stream.to_string(),
            data: Box::new(classify(data)?),
        });
    }

    if let Some(tag) = obj.get("e").and_then(Value::as_str) {
        return match tag {
            "depthUpdate" => decode(value, tag).map(StreamMessage::Depth),
            "trade" => decode(value, tag).map(StreamMessage::Trade),
            "24hrTicker" => decode(value, tag).map(StreamMessage::Ticker),
            "bookTicker" => decode(value, tag).map(StreamMessage::BookTicker),
            _ => Ok(StreamMessage::Unrecognized),
        };
    }

    if BOOK_TICKER_FIELDS.iter().all(|f| obj.contains_key(*f)) {
        return decode(value, "bookTicker").map(StreamMessage::BookTicker);
    }

    Ok(StreamMessage::Unrecognized)
}

fn decode<'de, T: Deserialize<'de>>(value: &'de Value, what: &str) -> AdapterResult<T> {
    T::deserialize(value).map_err(|e| AdapterError::Protocol(format!("invalid {what}: {e}")))
}
