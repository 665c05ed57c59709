//! The lock-free read path.
//!
//! Reads never touch the actor. A lookup walks the tiers in order — per-task
//! MRU (when the caller threads one through), block index, shared LRU,
//! persistent store — and promotes whatever it finds on the way back up.

use crate::{
    BlockIndex, BlockMru, ChainCells, ChainStore, IndexEntry, SharedBlockCache, StoreError,
};
use alloy_primitives::B256;
use lode_protocol::Block;
use std::sync::Arc;
use tokio::sync::watch;

/// Batch size for the lazy main-chain iterator.
const ITER_CHUNK: usize = 100;

/// Read access to the canonical chain.
///
/// Cheap to clone; all clones share the same index, caches, and store.
#[derive(Debug, Clone)]
pub struct ChainReader {
    store: Arc<dyn ChainStore>,
    index: Arc<BlockIndex>,
    cache: Arc<SharedBlockCache>,
    cells: Arc<ChainCells>,
    peak: watch::Receiver<Arc<Block>>,
}

impl ChainReader {
    pub(crate) fn new(
        store: Arc<dyn ChainStore>,
        index: Arc<BlockIndex>,
        cache: Arc<SharedBlockCache>,
        cells: Arc<ChainCells>,
        peak: watch::Receiver<Arc<Block>>,
    ) -> Self {
        Self { store, index, cache, cells, peak }
    }

    /// Returns the current peak as last published by the actor.
    pub fn peak(&self) -> Arc<Block> {
        Arc::clone(&self.peak.borrow())
    }

    /// Returns the height of the current peak without locking.
    pub fn peak_number(&self) -> u64 {
        self.cells.peak_number()
    }

    /// Returns the epoch of the current peak without locking.
    pub fn peak_epoch(&self) -> u64 {
        self.cells.peak_epoch()
    }

    /// Returns the block index shared with the actor.
    pub fn index(&self) -> &Arc<BlockIndex> {
        &self.index
    }

    /// Looks a block up by hash.
    pub fn block_by_hash(&self, hash: &B256) -> Result<Option<Arc<Block>>, StoreError> {
        match self.index.entry(hash) {
            Some(IndexEntry::Full(block)) => Ok(Some(block)),
            Some(IndexEntry::Placeholder) => self.load_shared(hash),
            // Until prefetch completes, an index miss is inconclusive.
            None if !self.index.is_complete() => self.load_shared(hash),
            None => Ok(None),
        }
    }

    /// Looks a block up by hash, consulting a per-task cache first.
    pub fn block_by_hash_cached(
        &self,
        mru: &mut BlockMru,
        hash: &B256,
    ) -> Result<Option<Arc<Block>>, StoreError> {
        if let Some(block) = mru.get(hash) {
            return Ok(Some(block));
        }
        let found = self.block_by_hash(hash)?;
        if let Some(block) = &found {
            mru.put(Arc::clone(block));
        }
        Ok(found)
    }

    /// Whether the hash names a known block, main or alt.
    pub fn is_block_known(&self, hash: &B256) -> Result<bool, StoreError> {
        if self.index.contains(hash) {
            return Ok(true);
        }
        if self.index.is_complete() {
            return Ok(false);
        }
        Ok(self.store.block_by_hash(hash)?.is_some())
    }

    /// Looks the main-chain block up at a height.
    pub fn block(&self, number: u64) -> Result<Option<Arc<Block>>, StoreError> {
        if let Some(block) = self.index.full_at(number) {
            return Ok(Some(block));
        }
        if let Some(hash) = self.index.hash_at(number) {
            return self.load_shared(&hash);
        }
        match self.store.block(number)? {
            Some(block) => {
                let block = Arc::new(block);
                self.cache.put(Arc::clone(&block));
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    /// Looks the main-chain block up containing the given transaction.
    pub fn block_by_txhash(&self, tx_hash: &B256) -> Result<Option<Arc<Block>>, StoreError> {
        Ok(self.store.block_by_txhash(tx_hash)?.map(Arc::new))
    }

    /// Returns a lazy iterator over the main chain, peak first, descending.
    ///
    /// Forward-only and not restartable; create a new iterator for a second
    /// pass. Blocks are fetched from the store in batches.
    pub fn blocks(&self) -> BlockIter {
        let peak = self.peak();
        BlockIter {
            store: Arc::clone(&self.store),
            cursor: Some(peak.hash()),
            buffer: Vec::new(),
        }
    }

    fn load_shared(&self, hash: &B256) -> Result<Option<Arc<Block>>, StoreError> {
        self.cache.get_or_load(hash, || {
            debug!(target: "chain", %hash, "Block cache miss, consulting store");
            Ok(self.store.block_by_hash(hash)?.map(Arc::new))
        })
    }
}

/// Lazy descending iterator over main-chain blocks. See
/// [`ChainReader::blocks`].
#[derive(Debug)]
pub struct BlockIter {
    store: Arc<dyn ChainStore>,
    cursor: Option<B256>,
    buffer: Vec<Block>,
}

impl Iterator for BlockIter {
    type Item = Result<Arc<Block>, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() {
            let cursor = self.cursor.take()?;
            let batch = match self.store.blocks_by_hash(&cursor, ITER_CHUNK) {
                Ok(batch) => batch,
                Err(err) => return Some(Err(err)),
            };
            if batch.is_empty() {
                return None;
            }
            if let Some(last) = batch.last() {
                if last.number() > 0 {
                    self.cursor = Some(last.parent_hash());
                }
            }
            // Pop from the back; reverse the batch so iteration descends.
            self.buffer = batch;
            self.buffer.reverse();
        }
        self.buffer.pop().map(|block| Ok(Arc::new(block)))
    }
}
