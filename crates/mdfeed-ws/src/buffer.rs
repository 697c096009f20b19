//! Bounded outbound queue and inbound ring buffer.

use crate::message::{InboundMessage, OutboundPayload};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Payloads issued while disconnected, flushed FIFO on the next connect.
///
/// Once full, new items are rejected; the oldest entries are retained.
#[derive(Debug)]
pub struct OutboundQueue {
    items: VecDeque<OutboundPayload>,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Enqueue `payload`. Returns `false` when the queue is full.
    pub fn push(&mut self, payload: OutboundPayload) -> bool {
        if self.items.len() >= self.capacity {
            return false;
        }
        self.items.push_back(payload);
        true
    }

    /// Take every queued payload in insertion order.
    pub fn drain(&mut self) -> Vec<OutboundPayload> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn approx_bytes(&self) -> usize {
        self.items.iter().map(OutboundPayload::approx_size).sum()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Fixed-capacity ring of recent inbound messages.
#[derive(Debug)]
pub struct InboundBuffer {
    items: VecDeque<InboundMessage>,
    capacity: usize,
    /// Sum of `approx_size()` over the retained payloads.
    bytes: usize,
}

impl InboundBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            bytes: 0,
        }
    }

    /// Append `message`, evicting the oldest entry when full.
    ///
    /// Returns `true` if an entry was evicted.
    pub fn push(&mut self, message: InboundMessage) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let mut evicted = false;
        if self.items.len() >= self.capacity {
            if let Some(old) = self.items.pop_front() {
                self.bytes = self.bytes.saturating_sub(old.payload.approx_size());
                evicted = true;
            }
        }
        self.bytes += message.payload.approx_size();
        self.items.push_back(message);
        evicted
    }

    /// Entries received at or after `since`, in arrival order.
    pub fn since(&self, since: Option<DateTime<Utc>>) -> Vec<InboundMessage> {
        match since {
            Some(ts) => self
                .items
                .iter()
                .filter(|m| m.received_at >= ts)
                .cloned()
                .collect(),
            None => self.items.iter().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn approx_bytes(&self) -> usize {
        self.bytes
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.bytes = 0;
    }
}
