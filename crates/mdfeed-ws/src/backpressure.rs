//! Inbound backpressure gate.
//!
//! Every accepted inbound message takes a slot in the processing queue; a
//! paced drain task frees one slot per tick. Once the queue reaches the
//! threshold the oldest ~10% of slots are discarded and arrivals are dropped
//! until the drain brings the queue below half the threshold.

use std::collections::VecDeque;
use std::time::Instant;
use tracing::{info, warn};

/// Outcome of offering a message to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Message may be buffered and emitted.
    Accepted,
    /// Message must be dropped. `first` is set on the arrival that tripped
    /// the gate, which is when the one-shot warning fires.
    Dropped { first: bool },
}

/// Processing queue with hysteresis.
#[derive(Debug)]
pub struct ProcessingQueue {
    threshold: usize,
    slots: VecDeque<Instant>,
    active: bool,
    dropped: u64,
}

impl ProcessingQueue {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            slots: VecDeque::new(),
            active: false,
            dropped: 0,
        }
    }

    /// Offer one arrival.
    pub fn admit(&mut self) -> Admission {
        if self.active {
            self.dropped += 1;
            return Admission::Dropped { first: false };
        }

        self.slots.push_back(Instant::now());
        if self.slots.len() < self.threshold {
            return Admission::Accepted;
        }

        let shed = (self.slots.len() / 10).max(1);
        self.slots.drain(..shed);
        self.active = true;
        self.dropped += 1;
        warn!(
            threshold = self.threshold,
            shed,
            queued = self.slots.len(),
            "Backpressure engaged, dropping inbound messages"
        );
        Admission::Dropped { first: true }
    }

    /// Free one slot. Returns `true` when this released the gate.
    pub fn drain_one(&mut self) -> bool {
        self.slots.pop_front();
        if self.active && self.slots.len() < self.threshold / 2 {
            self.active = false;
            info!(
                queued = self.slots.len(),
                dropped = self.dropped,
                "Backpressure released"
            );
            return true;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Messages dropped by this gate since the last clear.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.active = false;
        self.dropped = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_below_threshold() {
        let mut queue = ProcessingQueue::new(10);
        for _ in 0..9 {
            assert_eq!(queue.admit(), Admission::Accepted);
        }
        assert_eq!(queue.len(), 9);
        assert!(!queue.is_active());
    }

    #[test]
    fn test_trips_at_threshold_and_sheds_oldest() {
        let mut queue = ProcessingQueue::new(20);
        for _ in 0..19 {
            queue.admit();
        }
        assert_eq!(queue.admit(), Admission::Dropped { first: true });
        // 20 slots, 10% shed
        assert_eq!(queue.len(), 18);
        assert!(queue.is_active());
    }

    #[test]
    fn test_drops_until_below_half_threshold() {
        let mut queue = ProcessingQueue::new(10);
        for _ in 0..10 {
            queue.admit();
        }
        assert!(queue.is_active());
        assert_eq!(queue.len(), 9);

        // Still gated while draining from 9 down to 5.
        for _ in 0..4 {
            assert_eq!(queue.admit(), Admission::Dropped { first: false });
            assert!(!queue.drain_one());
        }
        assert_eq!(queue.len(), 5);
        assert!(queue.is_active());

        // 5 -> 4 crosses below threshold / 2.
        assert!(queue.drain_one());
        assert!(!queue.is_active());
        assert_eq!(queue.admit(), Admission::Accepted);
        assert_eq!(queue.dropped(), 5);
    }

    #[test]
    fn test_drain_on_empty_is_noop() {
        let mut queue = ProcessingQueue::new(4);
        assert!(!queue.drain_one());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_resets_gate() {
        let mut queue = ProcessingQueue::new(2);
        queue.admit();
        queue.admit();
        assert!(queue.is_active());
        queue.clear();
        assert!(!queue.is_active());
        assert_eq!(queue.dropped(), 0);
        assert_eq!(queue.admit(), Admission::Accepted);
    }
}
