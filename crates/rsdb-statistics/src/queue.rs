//! Bounded event queues feeding the statistics handle

use crossbeam_channel::{Receiver, Sender, TrySendError};
use rsdb_common::{Result, RsdbError};

/// Bounded multi-producer FIFO with a non-blocking drain.
///
/// Producers never block: a push onto a full queue fails and hands the item
/// back, the caller decides whether to drop, coalesce or report it.
pub struct EventQueue<T> {
    name: &'static str,
    capacity: usize,
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> EventQueue<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self {
            name,
            capacity,
            tx,
            rx,
        }
    }

    /// Enqueue `item`, returning it if the queue is full.
    pub fn try_push(&self, item: T) -> std::result::Result<(), T> {
        // Both ends live in `self`, so the channel cannot disconnect.
        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(item) | TrySendError::Disconnected(item) => item,
        })
    }

    /// Enqueue `item`, failing with [`RsdbError::QueueFull`] when full.
    pub fn push(&self, item: T) -> Result<()> {
        self.try_push(item).map_err(|_| {
            tracing::warn!("{} queue is full ({} items), rejecting event", self.name, self.capacity);
            RsdbError::QueueFull(format!("{} queue (capacity {})", self.name, self.capacity))
        })
    }

    /// Take everything currently queued, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Discard everything queued.
    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}
