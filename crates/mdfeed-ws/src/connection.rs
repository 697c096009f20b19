//! WebSocket connection manager.
//!
//! Owns the socket lifecycle: connect with timeout, heartbeat, reconnection
//! with capped exponential backoff, outbound queueing while disconnected,
//! inbound buffering and backpressure.
//!
//! Each `connect()` starts a *run*: a supervisor task that owns the socket and
//! every timer, plus a paced drain task for the processing queue. Both watch a
//! per-run cancellation token. A generation counter is bumped by every
//! `connect`/`disconnect`/`destroy`, and a task only touches shared state while
//! its generation is current, so work that completes after a teardown is a
//! no-op.

use crate::backpressure::{Admission, ProcessingQueue};
use crate::buffer::{InboundBuffer, OutboundQueue};
use crate::config::ConnectionConfig;
use crate::error::{ErrorCategory, WsError, WsResult};
use crate::events::{
    ConnectionEvent, ConnectionEventKind, ConnectionWarning, ErrorEvent, EventEmitter, ListenerId,
};
use crate::heartbeat::{HeartbeatMonitor, HeartbeatStats};
use crate::message::{InboundMessage, OutboundPayload, Payload, SendOutcome};
use crate::metrics::{MetricsTracker, PerformanceMetrics};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async_tls_with_config;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }

    pub const ALL: [ConnectionState; 5] = [
        Self::Disconnected,
        Self::Connecting,
        Self::Connected,
        Self::Reconnecting,
        Self::Error,
    ];
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of the connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub state: ConnectionState,
    pub url: String,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    pub connected_at: Option<DateTime<Utc>>,
    pub queued_outbound: usize,
    pub buffered_inbound: usize,
    pub processing_queue_len: usize,
    pub backpressure_active: bool,
    pub can_manual_retry: bool,
    pub destroyed: bool,
}

/// How a session ended.
#[derive(Debug)]
enum SessionEnd {
    /// Run cancelled by `disconnect`/`destroy`.
    Cancelled,
    /// A newer run took over while this one was connecting.
    Stale,
    /// Server closed with a normal close code.
    Closed,
    /// Connection lifetime elapsed; reconnect without backoff.
    Rollover,
    /// Abnormal close or stream end.
    Dropped(WsError),
    /// Transport failure or connect timeout.
    Failed(WsError),
}

/// Mutable state guarded by a single lock.
struct Core {
    state: ConnectionState,
    generation: u64,
    destroyed: bool,
    reconnect_attempts: u32,
    run_token: CancellationToken,
    /// Writer of the live session.
    writer: Option<mpsc::UnboundedSender<Message>>,
    connected_at: Option<DateTime<Utc>>,
    outbound: OutboundQueue,
    outbound_full_warned: bool,
    inbound: InboundBuffer,
    inbound_full_warned: bool,
    processing: ProcessingQueue,
    metrics: MetricsTracker,
}

impl Core {
    fn set_state(&mut self, next: ConnectionState, events: &mut Vec<ConnectionEvent>) {
        let previous = self.state;
        if previous == next {
            return;
        }
        self.state = next;
        info!(from = %previous, to = %next, "Connection state changed");
        events.push(ConnectionEvent::StatusChanged {
            previous,
            current: next,
        });
    }

    fn record_error(&mut self, err: &WsError, events: &mut Vec<ConnectionEvent>) {
        let message = err.to_string();
        self.metrics.record_error(message.clone());
        events.push(ConnectionEvent::Error(ErrorEvent {
            category: err.category(),
            message,
        }));
    }

    fn refresh_memory_estimate(&mut self) {
        let bytes = self.inbound.approx_bytes() + self.outbound.approx_bytes();
        self.metrics.set_memory_usage(bytes);
    }

    fn can_manual_retry(&self, max_attempts: u32) -> bool {
        self.state == ConnectionState::Error && self.reconnect_attempts >= max_attempts
    }
}

struct Shared {
    config: ConnectionConfig,
    core: Mutex<Core>,
    events: EventEmitter<ConnectionEvent>,
    heartbeat: HeartbeatMonitor,
}

impl Shared {
    /// Run `f` under the lock, then emit the collected events.
    fn with_core<R>(&self, f: impl FnOnce(&mut Core, &mut Vec<ConnectionEvent>) -> R) -> R {
        let mut events = Vec::new();
        let result = {
            let mut core = self.core.lock();
            f(&mut core, &mut events)
        };
        for event in &events {
            self.events.emit(event);
        }
        result
    }

    /// Like [`Shared::with_core`], but only while `generation` is current.
    fn with_current<R>(
        &self,
        generation: u64,
        f: impl FnOnce(&mut Core, &mut Vec<ConnectionEvent>) -> R,
    ) -> Option<R> {
        self.with_core(|core, events| {
            if core.destroyed || core.generation != generation {
                return None;
            }
            Some(f(core, events))
        })
    }

    fn handle_inbound(&self, generation: u64, payload: Payload, wire_len: usize) {
        let message = InboundMessage::new(payload);
        let config = &self.config;

        self.with_current(generation, |core, events| {
            core.metrics.record_message(wire_len, message.received_at);

            if config.enable_backpressure {
                if let Admission::Dropped { first } = core.processing.admit() {
                    core.metrics.record_dropped();
                    if first {
                        events.push(ConnectionEvent::Warning(ConnectionWarning::Backpressure {
                            queued: core.processing.len(),
                            threshold: core.processing.threshold(),
                        }));
                    }
                    return;
                }
            }

            if config.enable_buffering {
                let evicted = core.inbound.push(message.clone());
                if evicted && !core.inbound_full_warned {
                    core.inbound_full_warned = true;
                    warn!(
                        capacity = core.inbound.capacity(),
                        "Inbound buffer full, evicting oldest entries"
                    );
                    events.push(ConnectionEvent::Warning(
                        ConnectionWarning::InboundBufferFull {
                            capacity: core.inbound.capacity(),
                        },
                    ));
                }
                core.refresh_memory_estimate();
            }

            events.push(ConnectionEvent::Message(message));
        });
    }

    fn record_heartbeat(&self, generation: u64, sent_at: DateTime<Utc>, elapsed: Duration) {
        let sample = self.heartbeat.record_ping(sent_at, elapsed);
        self.with_current(generation, |core, events| {
            core.metrics.record_latency(sample.latency_ms);
            events.push(ConnectionEvent::Heartbeat {
                latency_ms: sample.latency_ms,
            });
            if sample.degraded {
                warn!(latency_ms = sample.latency_ms, "Heartbeat latency degraded");
                events.push(ConnectionEvent::Warning(ConnectionWarning::HighLatency {
                    latency_ms: sample.latency_ms,
                }));
            }
        });
    }

    fn record_pong(&self, generation: u64, payload: &[u8]) {
        if let Some(rtt_ms) = self.heartbeat.record_pong(payload) {
            self.with_current(generation, |core, _| core.metrics.record_pong_rtt(rtt_ms));
        }
    }

    fn report_error(&self, generation: u64, err: &WsError) {
        error!(error = %err, "WebSocket error");
        self.with_current(generation, |core, events| core.record_error(err, events));
    }

    fn publish_performance(&self, generation: u64) {
        self.with_current(generation, |core, events| {
            core.metrics.roll_window(std::time::Instant::now());
            events.push(ConnectionEvent::PerformanceUpdate(core.metrics.snapshot()));
        });
    }

    /// Connecting -> Connected: flush the outbound queue into the new writer
    /// before publishing the state, so queued sends stay ahead of new ones.
    fn on_open(&self, generation: u64, writer: mpsc::UnboundedSender<Message>) -> bool {
        self.with_current(generation, |core, events| {
            let queued = core.outbound.drain();
            let flushed = queued.len();
            for payload in queued {
                match payload.encode() {
                    Ok(text) => {
                        let _ = writer.send(Message::Text(text));
                    }
                    Err(e) => core.record_error(&WsError::Json(e), events),
                }
            }
            core.outbound_full_warned = false;
            core.refresh_memory_estimate();

            core.writer = Some(writer);
            core.reconnect_attempts = 0;
            core.connected_at = Some(Utc::now());
            core.metrics.mark_connected();
            info!(flushed, "WebSocket connected");
            core.set_state(ConnectionState::Connected, events);
        })
        .is_some()
    }

    fn on_session_closed(&self, generation: u64) {
        self.with_current(generation, |core, _| {
            core.writer = None;
            core.metrics.mark_disconnected();
        });
    }

    /// Decide what follows a failed or dropped session.
    ///
    /// Returns the backoff delay, or `None` when the run must stop (stale or
    /// attempts exhausted).
    fn schedule_reconnect(&self, generation: u64) -> Option<Duration> {
        let max = self.config.max_reconnect_attempts;
        self.with_current(generation, |core, events| {
            if core.reconnect_attempts >= max {
                error!(attempts = core.reconnect_attempts, "Max reconnection attempts reached");
                core.set_state(ConnectionState::Error, events);
                return None;
            }
            core.reconnect_attempts += 1;
            let delay = self.config.reconnect_delay(core.reconnect_attempts);
            warn!(
                attempt = core.reconnect_attempts,
                max,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );
            core.set_state(ConnectionState::Reconnecting, events);
            Some(delay)
        })
        .flatten()
    }

    fn transition(&self, generation: u64, next: ConnectionState) -> bool {
        self.with_current(generation, |core, events| core.set_state(next, events))
            .is_some()
    }

    /// Supervisor for one run: sessions and the reconnect policy between them.
    async fn run(self: Arc<Self>, generation: u64, token: CancellationToken) {
        loop {
            let end = self.run_session(generation, &token).await;
            self.on_session_closed(generation);

            match end {
                SessionEnd::Cancelled | SessionEnd::Stale => break,
                SessionEnd::Closed => {
                    info!("WebSocket closed normally");
                    self.transition(generation, ConnectionState::Disconnected);
                    break;
                }
                SessionEnd::Rollover => {
                    if !self.transition(generation, ConnectionState::Disconnected)
                        || !self.transition(generation, ConnectionState::Connecting)
                    {
                        break;
                    }
                    continue;
                }
                SessionEnd::Dropped(err) => {
                    warn!(error = %err, "WebSocket connection dropped");
                    if !self.transition(generation, ConnectionState::Disconnected) {
                        break;
                    }
                }
                SessionEnd::Failed(err) => {
                    self.report_error(generation, &err);
                    if !self.transition(generation, ConnectionState::Error) {
                        break;
                    }
                }
            }

            let Some(delay) = self.schedule_reconnect(generation) else {
                break;
            };

            tokio::select! {
                () = token.cancelled() => {
                    debug!("Run cancelled during backoff");
                    break;
                }
                () = tokio::time::sleep(delay) => {}
            }

            if !self.transition(generation, ConnectionState::Connecting) {
                break;
            }
        }
        token.cancel();
    }

    async fn run_session(&self, generation: u64, token: &CancellationToken) -> SessionEnd {
        let url = self.config.url.as_str();
        info!(url, "Connecting to WebSocket");

        let attempt = tokio::time::timeout(
            self.config.connection_timeout(),
            connect_async_tls_with_config(url, None, true, None),
        );
        let ws_stream = tokio::select! {
            () = token.cancelled() => return SessionEnd::Cancelled,
            result = attempt => match result {
                Err(_) => {
                    return SessionEnd::Failed(WsError::Timeout(self.config.connection_timeout_ms))
                }
                Ok(Err(e)) => return SessionEnd::Failed(e.into()),
                Ok(Ok((ws_stream, _response))) => ws_stream,
            },
        };
        let (mut write, mut read) = ws_stream.split();

        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel();
        if !self.on_open(generation, writer_tx) {
            let _ = write.send(Message::Close(None)).await;
            return SessionEnd::Stale;
        }
        self.heartbeat.reset();

        let interval = self.heartbeat.interval();
        let mut heartbeat = tokio::time::interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut perf = tokio::time::interval_at(
            Instant::now() + crate::metrics::RATE_WINDOW,
            crate::metrics::RATE_WINDOW,
        );
        perf.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let lifetime = self.config.max_connection_lifetime();
        let rollover = async move {
            match lifetime {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(rollover);

        loop {
            tokio::select! {
                biased;

                () = token.cancelled() => {
                    debug!("Run cancelled, closing socket");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(?e, "Failed to send Close frame");
                    }
                    return SessionEnd::Cancelled;
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let len = text.len();
                            self.handle_inbound(generation, Payload::from_text(&text), len);
                        }
                        Some(Ok(Message::Binary(data))) => {
                            let len = data.len();
                            self.handle_inbound(generation, Payload::Binary(data), len);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Received ping, sending pong");
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                return SessionEnd::Failed(e.into());
                            }
                        }
                        Some(Ok(Message::Pong(data))) => {
                            self.record_pong(generation, &data);
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code, f.reason.to_string()))
                                .unwrap_or((CloseCode::Normal, "Normal close".to_string()));
                            if code == CloseCode::Normal {
                                return SessionEnd::Closed;
                            }
                            return SessionEnd::Dropped(WsError::ConnectionClosed {
                                code: code.into(),
                                reason,
                            });
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => return SessionEnd::Failed(e.into()),
                        None => {
                            return SessionEnd::Dropped(WsError::ConnectionClosed {
                                code: 1006,
                                reason: "Stream ended".to_string(),
                            });
                        }
                    }
                }

                Some(frame) = writer_rx.recv() => {
                    if let Err(e) = write.send(frame).await {
                        self.report_error(generation, &WsError::SendFailed(e.to_string()));
                    }
                }

                _ = heartbeat.tick() => {
                    let sent_at = Utc::now();
                    let started = std::time::Instant::now();
                    let ping = Message::Ping(HeartbeatMonitor::ping_payload(sent_at));
                    match write.send(ping).await {
                        Ok(()) => self.record_heartbeat(generation, sent_at, started.elapsed()),
                        Err(e) => self.report_error(generation, &WsError::SendFailed(e.to_string())),
                    }
                }

                _ = perf.tick() => {
                    self.publish_performance(generation);
                }

                () = &mut rollover => {
                    info!("Connection lifetime reached, rolling over");
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Rollover;
                }
            }
        }
    }

    /// Paced drain of the processing queue, one entry per tick.
    async fn run_drain(self: Arc<Self>, generation: u64, token: CancellationToken) {
        let mut tick = tokio::time::interval(self.config.drain_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = token.cancelled() => return,
                _ = tick.tick() => {
                    let current = self.with_current(generation, |core, _| {
                        if !core.processing.is_empty() {
                            core.processing.drain_one();
                        }
                    });
                    if current.is_none() {
                        return;
                    }
                }
            }
        }
    }
}

/// WebSocket connection manager.
///
/// Cheap to share behind an `Arc`; every method takes `&self`. Requires a
/// Tokio runtime for `connect`/`retry`.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a new connection manager in `Disconnected`.
    pub fn new(config: ConnectionConfig) -> Self {
        let core = Core {
            state: ConnectionState::Disconnected,
            generation: 0,
            destroyed: false,
            reconnect_attempts: 0,
            run_token: CancellationToken::new(),
            writer: None,
            connected_at: None,
            outbound: OutboundQueue::new(config.max_queue_size),
            outbound_full_warned: false,
            inbound: InboundBuffer::new(config.buffer_size),
            inbound_full_warned: false,
            processing: ProcessingQueue::new(config.backpressure_threshold),
            metrics: MetricsTracker::new(),
        };
        Self {
            shared: Arc::new(Shared {
                heartbeat: HeartbeatMonitor::new(config.heartbeat_interval()),
                config,
                core: Mutex::new(core),
                events: EventEmitter::new(),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// Event registry for this manager.
    pub fn events(&self) -> &EventEmitter<ConnectionEvent> {
        &self.shared.events
    }

    pub fn on<F>(&self, kind: ConnectionEventKind, callback: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.shared.events.on(kind, callback)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.shared.events.off(id)
    }

    /// Start connecting. No-op while `Connecting` or `Connected`.
    pub fn connect(&self) -> WsResult<()> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| WsError::Runtime(e.to_string()))?;

        let started = self.shared.with_core(|core, events| {
            if core.destroyed {
                return Err(WsError::Destroyed);
            }
            if matches!(
                core.state,
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                debug!(state = %core.state, "connect() ignored");
                return Ok(None);
            }

            core.run_token.cancel();
            core.run_token = CancellationToken::new();
            core.generation += 1;
            core.set_state(ConnectionState::Connecting, events);
            Ok(Some((core.generation, core.run_token.clone())))
        })?;

        if let Some((generation, token)) = started {
            runtime.spawn(self.shared.clone().run(generation, token.clone()));
            if self.shared.config.enable_backpressure {
                runtime.spawn(self.shared.clone().run_drain(generation, token));
            }
        }
        Ok(())
    }

    /// Tear down the current run from any state. Never schedules a reconnect.
    pub fn disconnect(&self) {
        self.shared.with_core(|core, events| {
            core.generation += 1;
            core.run_token.cancel();
            core.writer = None;
            core.connected_at = None;
            core.reconnect_attempts = 0;
            core.metrics.mark_disconnected();
            core.set_state(ConnectionState::Disconnected, events);
        });
    }

    /// Manual retry after reconnection attempts are exhausted.
    pub fn retry(&self) -> WsResult<()> {
        let max = self.shared.config.max_reconnect_attempts;
        self.shared.with_core(|core, _| {
            if core.destroyed {
                return Err(WsError::Destroyed);
            }
            if !core.can_manual_retry(max) {
                return Err(WsError::RetryUnavailable(core.state.to_string()));
            }
            info!(attempts = core.reconnect_attempts, "Manual retry requested");
            core.reconnect_attempts = 0;
            Ok(())
        })?;
        self.connect()
    }

    /// Forcibly disconnect and release queues, buffers and listeners.
    ///
    /// Terminal: `connect`/`retry` fail afterwards.
    pub fn destroy(&self) {
        self.disconnect();
        self.shared.with_core(|core, _| {
            core.destroyed = true;
            core.outbound.clear();
            core.inbound.clear();
            core.processing.clear();
            core.refresh_memory_estimate();
        });
        self.shared.events.clear();
        info!("ConnectionManager destroyed");
    }

    /// Send `payload`, or queue it while not connected.
    pub fn send(&self, payload: impl Into<OutboundPayload>) -> SendOutcome {
        let payload = payload.into();
        self.shared.with_core(|core, events| {
            if core.destroyed {
                return SendOutcome::Dropped;
            }

            let writer = match (&core.state, &core.writer) {
                (ConnectionState::Connected, Some(writer)) => writer.clone(),
                _ => {
                    if core.outbound.push(payload) {
                        debug!(queued = core.outbound.len(), "Not connected, message queued");
                        core.refresh_memory_estimate();
                        return SendOutcome::Queued;
                    }
                    if !core.outbound_full_warned {
                        core.outbound_full_warned = true;
                        warn!(
                            capacity = core.outbound.capacity(),
                            "Outbound queue full, dropping messages"
                        );
                        events.push(ConnectionEvent::Warning(
                            ConnectionWarning::OutboundQueueFull {
                                capacity: core.outbound.capacity(),
                            },
                        ));
                    }
                    return SendOutcome::Dropped;
                }
            };

            let text = match payload.encode() {
                Ok(text) => text,
                Err(e) => {
                    core.record_error(&WsError::Json(e), events);
                    return SendOutcome::Failed;
                }
            };
            match writer.send(Message::Text(text)) {
                Ok(()) => SendOutcome::Sent,
                Err(_) => {
                    let err = WsError::SendFailed("session writer closed".to_string());
                    core.record_error(&err, events);
                    SendOutcome::Failed
                }
            }
        })
    }

    /// Report an error raised by a layer built on this manager.
    pub fn emit_error(&self, category: ErrorCategory, message: impl Into<String>) {
        let message = message.into();
        self.shared.with_core(|core, events| {
            core.metrics.record_error(message.clone());
            events.push(ConnectionEvent::Error(ErrorEvent { category, message }));
        });
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.core.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.core.lock().destroyed
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.core.lock().reconnect_attempts
    }

    /// True only in `Error` with reconnection attempts exhausted.
    pub fn can_manual_retry(&self) -> bool {
        self.shared
            .core
            .lock()
            .can_manual_retry(self.shared.config.max_reconnect_attempts)
    }

    /// Buffered inbound messages received at or after `since`.
    pub fn buffered_messages(&self, since: Option<DateTime<Utc>>) -> Vec<InboundMessage> {
        self.shared.core.lock().inbound.since(since)
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        let max = self.shared.config.max_reconnect_attempts;
        let core = self.shared.core.lock();
        ConnectionInfo {
            state: core.state,
            url: self.shared.config.url.clone(),
            reconnect_attempts: core.reconnect_attempts,
            max_reconnect_attempts: max,
            connected_at: core.connected_at,
            queued_outbound: core.outbound.len(),
            buffered_inbound: core.inbound.len(),
            processing_queue_len: core.processing.len(),
            backpressure_active: core.processing.is_active(),
            can_manual_retry: core.can_manual_retry(max),
            destroyed: core.destroyed,
        }
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.shared.core.lock().metrics.snapshot()
    }

    pub fn heartbeat_stats(&self) -> HeartbeatStats {
        self.shared.heartbeat.stats()
    }

    /// Drop buffered inbound data and reset the performance counters.
    pub fn clear_data(&self) {
        self.shared.with_core(|core, _| {
            core.inbound.clear();
            core.inbound_full_warned = false;
            core.processing.clear();
            core.metrics.reset();
            core.refresh_memory_estimate();
        });
    }

    #[cfg(test)]
    fn inject(&self, payload: Payload) {
        let generation = self.shared.core.lock().generation;
        let len = payload.approx_size();
        self.shared.handle_inbound(generation, payload, len);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.core.lock().run_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ConnectionEventKind;
    use serde_json::json;

    fn manager_with(config: ConnectionConfig) -> ConnectionManager {
        ConnectionManager::new(config)
    }

    fn collect(manager: &ConnectionManager) -> Arc<Mutex<Vec<ConnectionEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        manager.events().on_any(move |e| seen_clone.lock().push(e.clone()));
        seen
    }

    #[test]
    fn test_initial_state() {
        let manager = manager_with(ConnectionConfig::default());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.can_manual_retry());
        assert_eq!(manager.reconnect_attempts(), 0);
    }

    #[test]
    fn test_send_while_disconnected_queues() {
        let manager = manager_with(ConnectionConfig::default());
        assert_eq!(manager.send("a"), SendOutcome::Queued);
        assert_eq!(manager.send(json!({"b": 1})), SendOutcome::Queued);
        assert_eq!(manager.connection_info().queued_outbound, 2);
        assert!(manager.performance_metrics().memory_usage_bytes > 0);
    }

    #[test]
    fn test_outbound_queue_full_warns_once() {
        let manager = manager_with(ConnectionConfig {
            max_queue_size: 1,
            ..Default::default()
        });
        let seen = collect(&manager);

        assert_eq!(manager.send("a"), SendOutcome::Queued);
        assert_eq!(manager.send("b"), SendOutcome::Dropped);
        assert_eq!(manager.send("c"), SendOutcome::Dropped);

        let warnings = seen
            .lock()
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    ConnectionEvent::Warning(ConnectionWarning::OutboundQueueFull { capacity: 1 })
                )
            })
            .count();
        assert_eq!(warnings, 1);
    }

    #[test]
    fn test_inbound_buffer_rings_and_emits() {
        let manager = manager_with(ConnectionConfig {
            buffer_size: 3,
            enable_backpressure: false,
            ..Default::default()
        });
        let seen = collect(&manager);

        for n in 1..=5 {
            manager.inject(Payload::Json(json!({ "n": n })));
        }

        let kept: Vec<i64> = manager
            .buffered_messages(None)
            .iter()
            .map(|m| m.payload.as_json().unwrap()["n"].as_i64().unwrap())
            .collect();
        assert_eq!(kept, vec![3, 4, 5]);

        let events = seen.lock();
        let messages = events
            .iter()
            .filter(|e| matches!(e, ConnectionEvent::Message(_)))
            .count();
        assert_eq!(messages, 5);
        let buffer_warnings = events
            .iter()
            .filter(|e| matches!(e, ConnectionEvent::Warning(ConnectionWarning::InboundBufferFull { .. })))
            .count();
        assert_eq!(buffer_warnings, 1);
        assert_eq!(manager.performance_metrics().total_messages, 5);
    }

    #[test]
    fn test_backpressure_suppresses_emission() {
        let manager = manager_with(ConnectionConfig {
            backpressure_threshold: 4,
            ..Default::default()
        });
        let seen = collect(&manager);

        // No drain task runs without connect(), so the queue only grows.
        for n in 0..8 {
            manager.inject(Payload::Json(json!({ "n": n })));
        }

        let events = seen.lock();
        let emitted = events
            .iter()
            .filter(|e| matches!(e, ConnectionEvent::Message(_)))
            .count();
        assert_eq!(emitted, 3);
        let warnings = events
            .iter()
            .filter(|e| matches!(e, ConnectionEvent::Warning(ConnectionWarning::Backpressure { .. })))
            .count();
        assert_eq!(warnings, 1);
        drop(events);

        assert_eq!(manager.buffered_messages(None).len(), 3);
        assert_eq!(manager.performance_metrics().dropped_messages, 5);
        assert!(manager.connection_info().backpressure_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backpressure_releases_after_drain() {
        let manager = manager_with(ConnectionConfig {
            backpressure_threshold: 4,
            backpressure_drain_interval_ms: 10,
            ..Default::default()
        });
        let seen = collect(&manager);

        for n in 0..6 {
            manager.inject(Payload::Json(json!({ "n": n })));
        }
        assert!(manager.connection_info().backpressure_active);

        let generation = manager.shared.core.lock().generation;
        let token = CancellationToken::new();
        let drain = tokio::spawn(manager.shared.clone().run_drain(generation, token.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!manager.connection_info().backpressure_active);

        manager.inject(Payload::Json(json!({ "n": "after" })));

        let events = seen.lock();
        assert!(matches!(
            events.last(),
            Some(ConnectionEvent::Message(m)) if m.payload.as_json().unwrap()["n"] == "after"
        ));
        drop(events);
        let buffered = manager.buffered_messages(None);
        assert_eq!(buffered.len(), 4);
        assert_eq!(buffered[3].payload.as_json().unwrap()["n"], "after");
        assert_eq!(manager.performance_metrics().dropped_messages, 3);

        token.cancel();
        drain.await.unwrap();
    }

    #[test]
    fn test_clear_data_resets_metrics_and_buffer() {
        let manager = manager_with(ConnectionConfig::default());
        manager.inject(Payload::Text("x".into()));
        manager.emit_error(ErrorCategory::Protocol, "bad");
        manager.clear_data();

        let metrics = manager.performance_metrics();
        assert_eq!(metrics.total_messages, 0);
        assert_eq!(metrics.error_count, 0);
        assert!(manager.buffered_messages(None).is_empty());
    }

    #[test]
    fn test_retry_unavailable_when_not_exhausted() {
        let manager = manager_with(ConnectionConfig::default());
        assert!(matches!(manager.retry(), Err(WsError::RetryUnavailable(_))));
    }

    #[test]
    fn test_connect_requires_runtime() {
        let manager = manager_with(ConnectionConfig::default());
        assert!(matches!(manager.connect(), Err(WsError::Runtime(_))));
    }

    #[tokio::test]
    async fn test_connect_after_destroy_fails() {
        let manager = manager_with(ConnectionConfig::default());
        manager.destroy();
        assert!(matches!(manager.connect(), Err(WsError::Destroyed)));
        assert_eq!(manager.send("late"), SendOutcome::Dropped);
        assert_eq!(manager.events().listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_cancels_pending_reconnect() {
        // Nothing listens on port 9; the first attempt fails immediately.
        let manager = manager_with(ConnectionConfig {
            url: "ws://127.0.0.1:9".to_string(),
            reconnect_base_interval_ms: 60_000,
            max_reconnect_attempts: 3,
            ..Default::default()
        });
        let (_id, mut rx) = manager
            .events()
            .channel(Some(ConnectionEventKind::StatusChanged));

        manager.connect().unwrap();
        loop {
            match rx.recv().await {
                Some(ConnectionEvent::StatusChanged {
                    current: ConnectionState::Reconnecting,
                    ..
                }) => break,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }

        manager.destroy();
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        tokio::time::advance(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.is_destroyed());
    }
}
