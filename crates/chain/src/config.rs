//! Chain manager configuration.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Blocks per epoch on production networks.
pub const EPOCH_LENGTH: u64 = 40_320;

/// Blocks per epoch on development networks.
pub const DEV_EPOCH_LENGTH: u64 = 4;

/// Per-block gas cap enforced by validation.
pub const GAS_LIMIT: u64 = 20_000_000;

/// Minimum accepted gas price.
pub const GAS_PRICE: u64 = 0;

/// Estimation constant for per-transaction gas.
pub const AVG_TX_GAS: u64 = 200_000;

/// Target spacing between blocks.
pub const BLOCKTIME: Duration = Duration::from_secs(15);

/// Tunables for the chain manager.
///
/// [`Default`] yields production values; [`ChainConfig::dev`] shortens the
/// epoch for development networks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Number of recent main-chain blocks kept as full entries in the
    /// [`crate::BlockIndex`]. Older main blocks degrade to placeholders.
    pub window: u64,
    /// Capacity of the per-task hot block cache.
    pub task_cache_capacity: usize,
    /// Capacity of the process-wide shared block LRU.
    pub shared_cache_capacity: usize,
    /// Blocks per epoch.
    pub epoch_length: u64,
    /// Blocks behind the peak treated as irreversible by
    /// [`crate::ChainHandle::final_block`].
    pub finality_depth: u64,
    /// Budget for synchronous actor calls. `set_peak` and other
    /// administrative operations wait without bound.
    pub call_timeout: Duration,
    /// Sleep applied to background synchronizers by
    /// [`crate::SyncCoordinator::throttle`].
    pub sync_throttle: Duration,
    /// Blocks per exporter chunk; each chunk is one sink transaction.
    pub export_chunk_size: usize,
    /// Depth of the actor mailbox.
    pub mailbox_capacity: usize,
    /// Minimum spacing between ticket notifications after peak changes.
    pub ticket_debounce: Duration,
    /// This node's miner identity, used to choose broadcast over relay.
    pub miner: Address,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            window: 1000,
            task_cache_capacity: 10,
            shared_cache_capacity: 1000,
            epoch_length: EPOCH_LENGTH,
            finality_depth: 100,
            call_timeout: Duration::from_secs(25),
            sync_throttle: Duration::from_secs(30),
            export_chunk_size: 100,
            mailbox_capacity: 1024,
            ticket_debounce: Duration::from_secs(1),
            miner: Address::ZERO,
        }
    }
}

impl ChainConfig {
    /// Production configuration with the given miner identity.
    pub fn new(miner: Address) -> Self {
        Self { miner, ..Self::default() }
    }

    /// Development configuration: short epochs, otherwise production values.
    pub fn dev() -> Self {
        Self { epoch_length: DEV_EPOCH_LENGTH, ..Self::default() }
    }
}
