//! Binance protocol adapter.
//!
//! Sits on top of a [`ConnectionManager`] and turns its raw message stream
//! into typed [`MarketEvent`]s. Tracks which streams are subscribed per symbol
//! and correlates SUBSCRIBE/UNSUBSCRIBE requests with their acknowledgements
//! by request id.

use crate::config::AdapterConfig;
use crate::error::{AdapterError, AdapterResult};
use crate::events::{MarketEvent, MarketEventKind, NormalizedTrade, ProcessedDepth};
use crate::message::{classify, StreamMessage, SubscriptionAck, SubscriptionMethod, SubscriptionRequest};
use crate::stream::{dedup_streams, normalize_symbol, stream_names, StreamKind};
use chrono::{DateTime, Utc};
use mdfeed_ws::{
    ConnectionConfig, ConnectionEvent, ConnectionEventKind, ConnectionManager, ErrorCategory,
    ErrorEvent, EventEmitter, ListenerId, OutboundPayload, Payload, SendOutcome,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// A request sent but not yet acknowledged.
///
/// Entries stay until a matching ack arrives; a request whose ack never
/// comes is kept indefinitely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub method: SubscriptionMethod,
    pub params: Vec<String>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SubscriptionState {
    /// Lower-cased symbol -> subscribed streams.
    subscriptions: BTreeMap<String, Vec<StreamKind>>,
    pending: HashMap<u64, PendingRequest>,
}

struct AdapterInner {
    connection: Arc<ConnectionManager>,
    config: AdapterConfig,
    events: EventEmitter<MarketEvent>,
    state: Mutex<SubscriptionState>,
    next_id: AtomicU64,
    message_listener: Mutex<Option<ListenerId>>,
    destroyed: AtomicBool,
}

impl AdapterInner {
    fn ensure_live(&self) -> AdapterResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(AdapterError::Destroyed);
        }
        Ok(())
    }

    /// Send a subscription request, recording it as pending first.
    fn request(&self, method: SubscriptionMethod, params: Vec<String>) -> AdapterResult<u64> {
        self.ensure_live()?;
        if !self.connection.is_connected() {
            return Err(AdapterError::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = SubscriptionRequest {
            method,
            params: params.clone(),
            id,
        };
        let payload = OutboundPayload::json(&request)?;

        self.state.lock().pending.insert(
            id,
            PendingRequest {
                method,
                params,
                sent_at: Utc::now(),
            },
        );

        match self.connection.send(payload) {
            // Queued only if the socket dropped after the check above; the
            // request then goes out on the next connect.
            SendOutcome::Sent | SendOutcome::Queued => {
                debug!(id, ?method, "Subscription request sent");
                Ok(id)
            }
            outcome => {
                self.state.lock().pending.remove(&id);
                Err(AdapterError::SendFailed(outcome))
            }
        }
    }

    fn handle_payload(&self, payload: &Payload) {
        let Some(value) = payload.as_json() else {
            trace!("Ignoring non-JSON frame");
            return;
        };

        if let Err(e) = classify(value).and_then(|message| self.dispatch(message)) {
            let description = payload.describe();
            warn!(error = %e, payload = %description, "Failed to process stream message");
            self.events.emit(&MarketEvent::Error(ErrorEvent {
                category: ErrorCategory::Protocol,
                message: format!("{e}: {description}"),
            }));
        }
    }

    fn dispatch(&self, message: StreamMessage) -> AdapterResult<()> {
        match message {
            StreamMessage::SubscriptionAck(ack) => self.resolve_ack(ack),
            StreamMessage::Envelope { data, .. } => return self.dispatch(*data),
            // Raw events go out even when the decimal conversion fails.
            StreamMessage::Depth(update) => {
                let processed = ProcessedDepth::try_from(&update);
                self.events.emit(&MarketEvent::DepthUpdate(update));
                self.events.emit(&MarketEvent::ProcessedDepth(processed?));
            }
            StreamMessage::Trade(trade) => {
                let normalized = NormalizedTrade::try_from(&trade);
                self.events.emit(&MarketEvent::Trade(trade));
                self.events.emit(&MarketEvent::ProcessedTrade(normalized?));
            }
            StreamMessage::Ticker(ticker) => self.events.emit(&MarketEvent::Ticker(ticker)),
            StreamMessage::BookTicker(ticker) => {
                self.events.emit(&MarketEvent::BookTicker(ticker))
            }
            StreamMessage::Unrecognized => trace!("Unrecognized stream message"),
        }
        Ok(())
    }

    fn resolve_ack(&self, ack: SubscriptionAck) {
        let Some(pending) = self.state.lock().pending.remove(&ack.id) else {
            debug!(id = ack.id, "Ack for unknown request id ignored");
            return;
        };

        if ack.is_success() {
            info!(id = ack.id, method = ?pending.method, params = ?pending.params, "Subscription confirmed");
            self.events.emit(&MarketEvent::SubscriptionConfirmed {
                id: ack.id,
                result: ack.result,
            });
        } else {
            let error = ack.error.unwrap_or(Value::Null);
            warn!(id = ack.id, method = ?pending.method, %error, "Subscription rejected");
            self.events
                .emit(&MarketEvent::SubscriptionError { id: ack.id, error });
        }
    }

    fn detach(&self) {
        if let Some(id) = self.message_listener.lock().take() {
            self.connection.off(id);
        }
    }
}

/// Binance stream adapter.
///
/// Owns its connection manager: [`BinanceAdapter::destroy`] tears both down.
pub struct BinanceAdapter {
    inner: Arc<AdapterInner>,
}

impl BinanceAdapter {
    pub fn new(connection: ConnectionConfig, config: AdapterConfig) -> Self {
        Self::with_connection(Arc::new(ConnectionManager::new(connection)), config)
    }

    /// Attach to an existing connection manager.
    pub fn with_connection(connection: Arc<ConnectionManager>, config: AdapterConfig) -> Self {
        let inner = Arc::new(AdapterInner {
            connection,
            config,
            events: EventEmitter::new(),
            state: Mutex::new(SubscriptionState::default()),
            next_id: AtomicU64::new(1),
            message_listener: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        });

        // Weak so the connection's registry does not keep the adapter alive.
        let weak = Arc::downgrade(&inner);
        let listener = inner
            .connection
            .on(ConnectionEventKind::Message, move |event| {
                if let (Some(inner), ConnectionEvent::Message(message)) = (weak.upgrade(), event) {
                    inner.handle_payload(&message.payload);
                }
            });
        *inner.message_listener.lock() = Some(listener);

        Self { inner }
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.inner.connection
    }

    pub fn events(&self) -> &EventEmitter<MarketEvent> {
        &self.inner.events
    }

    pub fn on<F>(&self, kind: MarketEventKind, callback: F) -> ListenerId
    where
        F: Fn(&MarketEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, callback)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    pub fn connect(&self) -> AdapterResult<()> {
        self.inner.ensure_live()?;
        self.inner.connection.connect()?;
        Ok(())
    }

    pub fn disconnect(&self) {
        self.inner.connection.disconnect();
    }

    /// Subscribe `symbol` to `streams`, replacing any streams tracked for it.
    ///
    /// Returns the request id. Fails without sending when not connected.
    pub fn subscribe_to_symbol(&self, symbol: &str, streams: &[StreamKind]) -> AdapterResult<u64> {
        let symbol = normalize_symbol(symbol);
        let streams = dedup_streams(streams);
        if symbol.is_empty() || streams.is_empty() {
            return Err(AdapterError::EmptyRequest);
        }

        let id = self
            .inner
            .request(SubscriptionMethod::Subscribe, stream_names(&symbol, &streams))?;
        info!(symbol = %symbol, id, streams = ?streams, "Subscribed");
        self.inner.state.lock().subscriptions.insert(symbol, streams);
        Ok(id)
    }

    /// Unsubscribe every stream tracked for `symbol`.
    pub fn unsubscribe_from_symbol(&self, symbol: &str) -> AdapterResult<u64> {
        let symbol = normalize_symbol(symbol);
        let streams = self
            .inner
            .state
            .lock()
            .subscriptions
            .get(&symbol)
            .cloned()
            .ok_or_else(|| AdapterError::NotSubscribed(symbol.clone()))?;

        let id = self
            .inner
            .request(SubscriptionMethod::Unsubscribe, stream_names(&symbol, &streams))?;
        info!(symbol = %symbol, id, "Unsubscribed");
        self.inner.state.lock().subscriptions.remove(&symbol);
        Ok(id)
    }

    /// Subscribe several symbols to the same streams in one request.
    pub fn subscribe_to_multiple_symbols<S: AsRef<str>>(
        &self,
        symbols: &[S],
        streams: &[StreamKind],
    ) -> AdapterResult<u64> {
        let mut seen: Vec<String> = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let symbol = normalize_symbol(symbol.as_ref());
            if !symbol.is_empty() && !seen.contains(&symbol) {
                seen.push(symbol);
            }
        }
        let streams = dedup_streams(streams);
        if seen.is_empty() || streams.is_empty() {
            return Err(AdapterError::EmptyRequest);
        }

        let params = seen
            .iter()
            .flat_map(|symbol| stream_names(symbol, &streams))
            .collect();
        let id = self.inner.request(SubscriptionMethod::Subscribe, params)?;
        info!(symbols = ?seen, id, streams = ?streams, "Subscribed batch");

        let mut state = self.inner.state.lock();
        for symbol in seen {
            state.subscriptions.insert(symbol, streams.clone());
        }
        Ok(id)
    }

    /// Unsubscribe everything tracked in one batched request.
    ///
    /// Returns `None` when nothing is subscribed.
    pub fn clear_all_subscriptions(&self) -> AdapterResult<Option<u64>> {
        let params: Vec<String> = self
            .inner
            .state
            .lock()
            .subscriptions
            .iter()
            .flat_map(|(symbol, streams)| stream_names(symbol, streams))
            .collect();
        if params.is_empty() {
            return Ok(None);
        }

        let id = self.inner.request(SubscriptionMethod::Unsubscribe, params)?;
        info!(id, "Cleared all subscriptions");
        self.inner.state.lock().subscriptions.clear();
        Ok(Some(id))
    }

    /// Drop and re-establish the socket, then resubscribe every tracked symbol.
    ///
    /// Returns the new request ids, one per symbol.
    pub async fn reconnect_with_subscriptions(&self) -> AdapterResult<Vec<u64>> {
        self.inner.ensure_live()?;
        let tracked = self.subscriptions();
        info!(symbols = tracked.len(), "Reconnecting with subscriptions");

        let connection = &self.inner.connection;
        connection.disconnect();
        connection.connect()?;

        let interval = self.inner.config.reconnect_poll_interval();
        let mut polls = 0;
        while !connection.is_connected() {
            if polls >= self.inner.config.reconnect_poll_attempts {
                warn!(polls, "Reconnect did not complete in time");
                return Err(AdapterError::ReconnectTimeout(polls));
            }
            polls += 1;
            tokio::time::sleep(interval).await;
        }

        let mut ids = Vec::with_capacity(tracked.len());
        for (symbol, streams) in &tracked {
            ids.push(self.subscribe_to_symbol(symbol, streams)?);
        }
        Ok(ids)
    }

    /// Snapshot of tracked subscriptions keyed by lower-cased symbol.
    pub fn subscriptions(&self) -> BTreeMap<String, Vec<StreamKind>> {
        self.inner.state.lock().subscriptions.clone()
    }

    pub fn subscribed_streams(&self, symbol: &str) -> Option<Vec<StreamKind>> {
        self.inner
            .state
            .lock()
            .subscriptions
            .get(&normalize_symbol(symbol))
            .cloned()
    }

    /// Unacknowledged requests ordered by id.
    pub fn pending_requests(&self) -> Vec<(u64, PendingRequest)> {
        let mut pending: Vec<_> = self
            .inner
            .state
            .lock()
            .pending
            .iter()
            .map(|(id, req)| (*id, req.clone()))
            .collect();
        pending.sort_by_key(|(id, _)| *id);
        pending
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Detach from the connection, drop all tracking, and destroy the connection.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.detach();
        {
            let mut state = self.inner.state.lock();
            state.subscriptions.clear();
            state.pending.clear();
        }
        self.inner.events.clear();
        self.inner.connection.destroy();
        info!("BinanceAdapter destroyed");
    }
}

impl Drop for BinanceAdapter {
    fn drop(&mut self) {
        self.inner.detach();
    }
}
