//! Application wiring.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::metrics_server::serve_metrics;
use mdfeed_binance::{AdapterError, BinanceAdapter, MarketEvent};
use mdfeed_telemetry::Metrics;
use mdfeed_ws::{ConnectionEvent, ConnectionState, Event};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct Application {
    config: AppConfig,
    adapter: BinanceAdapter,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let adapter = BinanceAdapter::new(config.connection_config(), config.adapter.clone());
        Ok(Self { config, adapter })
    }

    pub fn adapter(&self) -> &BinanceAdapter {
        &self.adapter
    }

    /// Run until Ctrl-C, then tear everything down.
    pub async fn run(self) -> AppResult<()> {
        let mut connected_rx = self.wire_telemetry();

        let metrics_task = self.config.metrics_addr.map(|addr| {
            tokio::spawn(async move {
                if let Err(e) = serve_metrics(addr).await {
                    error!(error = %e, "Metrics server stopped");
                }
            })
        });

        info!(
            url = %self.adapter.connection().config().url,
            symbols = ?self.config.symbols,
            streams = ?self.config.streams,
            "Connecting"
        );
        self.adapter.connect()?;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested");
                    break;
                }
                Some(()) = connected_rx.recv() => self.subscribe_all(),
            }
        }

        if let Some(task) = metrics_task {
            task.abort();
        }
        let metrics = self.adapter.connection().performance_metrics();
        info!(
            total_messages = metrics.total_messages,
            total_bytes = metrics.total_bytes_received,
            errors = metrics.error_count,
            dropped = metrics.dropped_messages,
            "Final connection metrics"
        );
        self.adapter.destroy();
        Ok(())
    }

    /// Raw-endpoint subscriptions do not survive the socket, so every
    /// `Connected` transition re-issues them.
    fn subscribe_all(&self) {
        match self
            .adapter
            .subscribe_to_multiple_symbols(self.config.symbols.as_slice(), &self.config.streams)
        {
            Ok(id) => info!(id, "Subscription request issued"),
            // Dropped again before the request went out; the next Connected retries.
            Err(AdapterError::NotConnected) => debug!("Connection lost before subscribing"),
            Err(e) => error!(error = %e, "Failed to subscribe"),
        }
    }

    /// Route connection and market events to metrics and logs.
    ///
    /// Returns a receiver that yields once per `Connected` transition.
    fn wire_telemetry(&self) -> mpsc::UnboundedReceiver<()> {
        let (connected_tx, connected_rx) = mpsc::unbounded_channel();
        let connection = self.adapter.connection();
        let last_dropped = Arc::new(AtomicU64::new(0));

        connection.events().on_any(move |event| match event {
            ConnectionEvent::StatusChanged { previous, current } => {
                info!(%previous, %current, "Connection state changed");
                Metrics::ws_state_set(current.as_str());
                match current {
                    ConnectionState::Connected => {
                        let _ = connected_tx.send(());
                    }
                    ConnectionState::Reconnecting => Metrics::ws_reconnect("backoff"),
                    _ => {}
                }
            }
            ConnectionEvent::Error(e) => {
                warn!(category = e.category.as_str(), message = %e.message, "Connection error");
                Metrics::error(e.category.as_str());
            }
            ConnectionEvent::Heartbeat { latency_ms } => Metrics::heartbeat_latency(*latency_ms),
            ConnectionEvent::PerformanceUpdate(perf) => {
                Metrics::performance(
                    perf.messages_per_second,
                    perf.memory_usage_bytes as u64,
                    perf.last_pong_rtt_ms,
                );
                let previous = last_dropped.swap(perf.dropped_messages, Ordering::Relaxed);
                if perf.dropped_messages > previous {
                    Metrics::dropped("backpressure", perf.dropped_messages - previous);
                }
            }
            ConnectionEvent::Warning(warning) => warn!(?warning, "Connection warning"),
            ConnectionEvent::Message(_) => {}
        });

        self.adapter.events().on_any(|event| {
            Metrics::message(event.kind().as_str());
            match event {
                MarketEvent::SubscriptionConfirmed { id, .. } => {
                    info!(id, "Subscription confirmed");
                    Metrics::subscription_ack(true);
                }
                MarketEvent::SubscriptionError { id, error } => {
                    warn!(id, %error, "Subscription rejected");
                    Metrics::subscription_ack(false);
                }
                MarketEvent::ProcessedTrade(trade) => debug!(
                    symbol = %trade.symbol,
                    price = %trade.price,
                    quantity = %trade.quantity,
                    buyer_maker = trade.is_buyer_maker,
                    "Trade"
                ),
                MarketEvent::BookTicker(ticker) => debug!(
                    symbol = %ticker.symbol,
                    bid = %ticker.bid_price,
                    ask = %ticker.ask_price,
                    "Book ticker"
                ),
                MarketEvent::Error(e) => warn!(message = %e.message, "Stream message error"),
                _ => {}
            }
        });

        connected_rx
    }
}
