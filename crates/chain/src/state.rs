//! The chain state owned by the actor, and its lock-free projections.

use lode_protocol::Block;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// The canonical chain state.
///
/// Owned exclusively by the [`crate::ChainActor`]; no other component
/// mutates it. After genesis seeding the peak is never absent.
#[derive(Debug, Clone)]
pub struct ChainState {
    peak: Arc<Block>,
}

impl ChainState {
    /// Creates the state with the given peak.
    pub const fn new(peak: Arc<Block>) -> Self {
        Self { peak }
    }

    /// Returns the current canonical tip.
    pub fn peak(&self) -> Arc<Block> {
        Arc::clone(&self.peak)
    }

    /// Installs a new canonical tip.
    pub fn set_peak(&mut self, peak: Arc<Block>) {
        self.peak = peak;
    }
}

/// Process-global cells published by the actor for O(1) reads.
///
/// Single writer (the actor), many lock-free readers.
#[derive(Debug, Default)]
pub struct ChainCells {
    peak_epoch: AtomicU64,
    peak_number: AtomicU64,
}

impl ChainCells {
    /// Creates zeroed cells.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the epoch of the current peak.
    pub fn peak_epoch(&self) -> u64 {
        self.peak_epoch.load(Ordering::Acquire)
    }

    /// Returns the height of the current peak.
    pub fn peak_number(&self) -> u64 {
        self.peak_number.load(Ordering::Acquire)
    }

    /// Publishes the peak's epoch and height.
    pub fn publish(&self, epoch: u64, number: u64) {
        self.peak_epoch.store(epoch, Ordering::Release);
        self.peak_number.store(number, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_protocol::BlockHeader;

    #[test]
    fn cells_publish_and_read_back() {
        let cells = ChainCells::new();
        cells.publish(3, 121);
        assert_eq!(cells.peak_epoch(), 3);
        assert_eq!(cells.peak_number(), 121);
    }

    #[test]
    fn state_swaps_the_peak() {
        let a =
            Arc::new(Block::new(BlockHeader { number: 1, ..Default::default() }, vec![], vec![]));
        let b =
            Arc::new(Block::new(BlockHeader { number: 2, ..Default::default() }, vec![], vec![]));

        let mut state = ChainState::new(Arc::clone(&a));
        assert_eq!(state.peak().hash(), a.hash());

        state.set_peak(Arc::clone(&b));
        assert_eq!(state.peak().hash(), b.hash());
    }
}
