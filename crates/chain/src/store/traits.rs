//! The persistent store contract.

use crate::StoreError;
use alloy_primitives::B256;
use lode_protocol::Block;
use std::fmt::Debug;

/// Provides an interface for the chain manager to read and write persistent
/// block storage.
///
/// The store distinguishes main-chain rows (reachable by height) from alt
/// rows (reachable only by hash). [`ChainStore::put_peak`] is the single
/// operation that rewrites that distinction; everything else is a plain
/// insert or lookup.
///
/// Implementations are expected to provide thread-safe access; methods take
/// `&self` and may be called concurrently from readers while the chain actor
/// writes.
pub trait ChainStore: Send + Sync + Debug + 'static {
    /// Returns the persisted peak block, or `None` when the store is empty.
    fn peak_block(&self) -> Result<Option<Block>, StoreError>;

    /// Atomically installs `block` as the peak and marks its ancestry as the
    /// main chain, displacing rows of the abandoned branch to alt status.
    fn put_peak(&self, block: &Block) -> Result<(), StoreError>;

    /// Inserts or overwrites `block` as a main-chain row at its height.
    fn put_block(&self, block: &Block) -> Result<(), StoreError>;

    /// Inserts `block` as an alt row. Never disturbs the main chain.
    fn put_new_block(&self, block: &Block) -> Result<(), StoreError>;

    /// Returns the main-chain block at the given height.
    fn block(&self, number: u64) -> Result<Option<Block>, StoreError>;

    /// Returns any known block with the given hash, main or alt.
    fn block_by_hash(&self, hash: &B256) -> Result<Option<Block>, StoreError>;

    /// Returns the main-chain block containing the given transaction.
    fn block_by_txhash(&self, tx_hash: &B256) -> Result<Option<Block>, StoreError>;

    /// Returns up to `limit` blocks walking parent pointers down from
    /// `hash`, starting block included, in descending order.
    fn blocks_by_hash(&self, hash: &B256, limit: usize) -> Result<Vec<Block>, StoreError>;

    /// Returns the top `count` main-chain blocks by height, descending.
    fn top_blocks(&self, count: usize) -> Result<Vec<Block>, StoreError>;

    /// Returns `(hash, number)` for every known block, main and alt.
    fn all_block_hashes(&self) -> Result<Vec<(B256, u64)>, StoreError>;

    /// Drops every alt row.
    fn clear_alt_blocks(&self) -> Result<(), StoreError>;

    /// Deletes everything, including the peak marker.
    fn truncate_blocks(&self) -> Result<(), StoreError>;
}
