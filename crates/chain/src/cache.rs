//! Hot block caches.
//!
//! Two tiers sit in front of the persistent store: a tiny most-recently-used
//! cache scoped to a single read operation (threaded through the call, never
//! shared), and a process-wide LRU shared by all readers to amortize store
//! misses.

use alloy_primitives::B256;
use lode_protocol::Block;
use lru::LruCache;
use parking_lot::Mutex;
use std::{num::NonZeroUsize, sync::Arc};

/// A per-task block cache.
///
/// Bound to the logical scope of one importer run or read operation. Not
/// synchronized; do not share across tasks.
#[derive(Debug)]
pub struct BlockMru {
    entries: LruCache<B256, Arc<Block>>,
}

impl BlockMru {
    /// Creates a cache with the given capacity.
    ///
    /// `capacity` must be non-zero.
    pub fn new(capacity: usize) -> Self {
        Self { entries: LruCache::new(NonZeroUsize::new(capacity).expect("non-zero capacity")) }
    }

    /// Returns the cached block, refreshing its recency.
    pub fn get(&mut self, hash: &B256) -> Option<Arc<Block>> {
        self.entries.get(hash).map(Arc::clone)
    }

    /// Caches a block, evicting the least recently used entry when full.
    pub fn put(&mut self, block: Arc<Block>) {
        self.entries.put(block.hash(), block);
    }

    /// Number of cached blocks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The process-wide shared block LRU.
///
/// Thread-safe; all readers funnel store misses through this cache.
#[derive(Debug)]
pub struct SharedBlockCache {
    entries: Mutex<LruCache<B256, Arc<Block>>>,
}

impl SharedBlockCache {
    /// Creates a cache with the given capacity.
    ///
    /// `capacity` must be non-zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).expect("non-zero capacity"),
            )),
        }
    }

    /// Returns the cached block, refreshing its recency.
    pub fn get(&self, hash: &B256) -> Option<Arc<Block>> {
        self.entries.lock().get(hash).map(Arc::clone)
    }

    /// Caches a block.
    pub fn put(&self, block: Arc<Block>) {
        self.entries.lock().put(block.hash(), block);
    }

    /// Returns the cached block or loads, caches, and returns it.
    ///
    /// The loader runs outside the cache lock; concurrent misses may race
    /// and both load, which is harmless because entries are immutable.
    pub fn get_or_load<E>(
        &self,
        hash: &B256,
        loader: impl FnOnce() -> Result<Option<Arc<Block>>, E>,
    ) -> Result<Option<Arc<Block>>, E> {
        if let Some(block) = self.get(hash) {
            return Ok(Some(block));
        }
        let loaded = loader()?;
        if let Some(block) = &loaded {
            self.put(Arc::clone(block));
        }
        Ok(loaded)
    }

    /// Number of cached blocks.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
