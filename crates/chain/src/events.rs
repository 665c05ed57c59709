//! Chain event publication.

use lode_protocol::Block;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Depth of the broadcast buffer. Slow subscribers that fall further behind
/// observe a lagged error, not backpressure on the actor.
const EVENT_BUFFER: usize = 256;

/// Events published by the chain manager.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    /// A block became the canonical peak.
    PeakUpdated(Arc<Block>),
    /// The active-sync slot was claimed (`true`) or released (`false`).
    Syncing(bool),
}

/// The pub/sub bus for [`ChainEvent`]s.
///
/// Cloning is cheap; all clones publish into the same stream.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChainEvent>,
}

impl EventBus {
    /// Creates a bus with the default buffer depth.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    /// Returns a receiver over future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event to all current subscribers.
    ///
    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: ChainEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
