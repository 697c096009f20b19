//! Market events emitted by the adapter.

use crate::error::{AdapterError, AdapterResult};
use crate::message::{BookTicker, DepthUpdate, PriceLevel, RawTrade, Ticker24h};
use mdfeed_ws::{ErrorEvent, Event};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;

/// Trade with decimal price and quantity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedTrade {
    pub symbol: String,
    pub trade_id: u64,
    pub price: Decimal,
    pub quantity: Decimal,
    pub is_buyer_maker: bool,
    /// Trade time (ms since epoch).
    pub timestamp: i64,
    pub event_time: Option<i64>,
}

impl TryFrom<&RawTrade> for NormalizedTrade {
    type Error = AdapterError;

    fn try_from(raw: &RawTrade) -> AdapterResult<Self> {
        Ok(Self {
            symbol: raw.symbol.clone(),
            trade_id: raw.trade_id,
            price: parse_decimal("p", &raw.price)?,
            quantity: parse_decimal("q", &raw.quantity)?,
            is_buyer_maker: raw.is_buyer_maker,
            timestamp: raw.trade_time,
            event_time: raw.event_time,
        })
    }
}

/// Book side with decimal levels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Level {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Depth update with decimal levels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedDepth {
    pub symbol: String,
    pub event_time: i64,
    pub first_update_id: u64,
    pub final_update_id: u64,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

impl TryFrom<&DepthUpdate> for ProcessedDepth {
    type Error = AdapterError;

    fn try_from(raw: &DepthUpdate) -> AdapterResult<Self> {
        Ok(Self {
            symbol: raw.symbol.clone(),
            event_time: raw.event_time,
            first_update_id: raw.first_update_id,
            final_update_id: raw.final_update_id,
            bids: parse_levels(&raw.bids)?,
            asks: parse_levels(&raw.asks)?,
        })
    }
}

fn parse_levels(levels: &[PriceLevel]) -> AdapterResult<Vec<Level>> {
    levels
        .iter()
        .map(|[price, quantity]| {
            Ok(Level {
                price: parse_decimal("price", price)?,
                quantity: parse_decimal("quantity", quantity)?,
            })
        })
        .collect()
}

fn parse_decimal(field: &'static str, value: &str) -> AdapterResult<Decimal> {
    Decimal::from_str(value).map_err(|_| AdapterError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Events emitted by [`crate::BinanceAdapter`].
#[derive(Debug, Clone)]
pub enum MarketEvent {
    DepthUpdate(DepthUpdate),
    Trade(RawTrade),
    Ticker(Ticker24h),
    BookTicker(BookTicker),
    ProcessedTrade(NormalizedTrade),
    ProcessedDepth(ProcessedDepth),
    SubscriptionConfirmed { id: u64, result: Value },
    SubscriptionError { id: u64, error: Value },
    Error(ErrorEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketEventKind {
    DepthUpdate,
    Trade,
    Ticker,
    BookTicker,
    ProcessedTrade,
    ProcessedDepth,
    SubscriptionConfirmed,
    SubscriptionError,
    Error,
}

impl MarketEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DepthUpdate => "depth_update",
            Self::Trade => "trade",
            Self::Ticker => "ticker",
            Self::BookTicker => "book_ticker",
            Self::ProcessedTrade => "processed_trade",
            Self::ProcessedDepth => "processed_depth",
            Self::SubscriptionConfirmed => "subscription_confirmed",
            Self::SubscriptionError => "subscription_error",
            Self::Error => "error",
        }
    }
}

impl Event for MarketEvent {
    type Kind = MarketEventKind;

    fn kind(&self) -> MarketEventKind {
        match self {
            Self::DepthUpdate(_) => MarketEventKind::DepthUpdate,
            Self::Trade(_) => MarketEventKind::Trade,
            Self::Ticker(_) => MarketEventKind::Ticker,
            Self::BookTicker(_) => MarketEventKind::BookTicker,
            Self::ProcessedTrade(_) => MarketEventKind::ProcessedTrade,
            Self::ProcessedDepth(_) => MarketEventKind::ProcessedDepth,
            Self::SubscriptionConfirmed { .. } => MarketEventKind::SubscriptionConfirmed,
            Self::SubscriptionError { .. } => MarketEventKind::SubscriptionError,
            Self::Error(_) => MarketEventKind::Error,
        }
    }
}
