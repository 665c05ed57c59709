//! The in-memory block index.
//!
//! Two tables in one structure: `hash → entry` for every known block and
//! `number → hash` for blocks currently on the main chain. Only the most
//! recent `window` main-chain blocks keep their full body in memory; older
//! entries degrade to placeholders and are refetched from the store on
//! demand.
//!
//! Readers take the locks briefly and never block each other; writes come
//! only from the chain actor and the startup prefetch, which serialize
//! themselves.

use alloy_primitives::B256;
use lode_protocol::Block;
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// A `hash → block` table entry.
#[derive(Debug, Clone)]
pub enum IndexEntry {
    /// The full block body is resident in memory.
    Full(Arc<Block>),
    /// The hash is known; fetch the body from the store when needed.
    Placeholder,
}

impl IndexEntry {
    /// Returns the resident block, if this entry holds one.
    pub fn as_full(&self) -> Option<Arc<Block>> {
        match self {
            Self::Full(block) => Some(Arc::clone(block)),
            Self::Placeholder => None,
        }
    }
}

/// The shared block index.
#[derive(Debug, Default)]
pub struct BlockIndex {
    by_hash: RwLock<HashMap<B256, IndexEntry>>,
    by_number: RwLock<HashMap<u64, B256>>,
    placeholder_complete: AtomicBool,
}

impl BlockIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a full block entry for its hash.
    pub fn put_full(&self, block: Arc<Block>) {
        self.by_hash.write().insert(block.hash(), IndexEntry::Full(block));
    }

    /// Installs a placeholder entry, downgrading any full entry present.
    pub fn put_placeholder(&self, hash: B256) {
        self.by_hash.write().insert(hash, IndexEntry::Placeholder);
    }

    /// Marks a hash known without disturbing an existing full entry.
    pub fn note_known(&self, hash: B256) {
        self.by_hash.write().entry(hash).or_insert(IndexEntry::Placeholder);
    }

    /// Maps a main-chain height to its block hash.
    pub fn put_number(&self, number: u64, hash: B256) {
        self.by_number.write().insert(number, hash);
    }

    /// Returns the entry for a hash, if the hash is known.
    pub fn entry(&self, hash: &B256) -> Option<IndexEntry> {
        self.by_hash.read().get(hash).cloned()
    }

    /// Returns the resident block for a hash.
    pub fn full_block(&self, hash: &B256) -> Option<Arc<Block>> {
        self.by_hash.read().get(hash).and_then(IndexEntry::as_full)
    }

    /// Whether the hash is known, as a full entry or a placeholder.
    pub fn contains(&self, hash: &B256) -> bool {
        self.by_hash.read().contains_key(hash)
    }

    /// Returns the main-chain hash at a height.
    pub fn hash_at(&self, number: u64) -> Option<B256> {
        self.by_number.read().get(&number).copied()
    }

    /// Returns the resident block at a main-chain height.
    pub fn full_at(&self, number: u64) -> Option<Arc<Block>> {
        let hash = self.hash_at(number)?;
        self.full_block(&hash)
    }

    /// Demotes the entry at a height to a placeholder.
    ///
    /// The `number → hash` mapping is retained; only the resident body is
    /// dropped. A no-op when the height is unknown.
    pub fn evict_number(&self, number: u64) {
        let Some(hash) = self.hash_at(number) else { return };
        let mut by_hash = self.by_hash.write();
        if let Some(entry) = by_hash.get_mut(&hash) {
            if matches!(entry, IndexEntry::Full(_)) {
                *entry = IndexEntry::Placeholder;
            }
        }
    }

    /// Drops `number → hash` mappings strictly above the given height and
    /// demotes each dropped hash to a placeholder.
    ///
    /// Used after a reorg onto a shorter, heavier branch: the abandoned
    /// suffix is off the main chain now, so no stale height may outlive the
    /// new peak and none of its blocks may stay resident.
    pub fn truncate_numbers_above(&self, number: u64) {
        let mut dropped = Vec::new();
        self.by_number.write().retain(|&n, hash| {
            if n <= number {
                return true;
            }
            dropped.push(*hash);
            false
        });
        if dropped.is_empty() {
            return;
        }
        let mut by_hash = self.by_hash.write();
        for hash in dropped {
            if let Some(entry) = by_hash.get_mut(&hash) {
                if matches!(entry, IndexEntry::Full(_)) {
                    *entry = IndexEntry::Placeholder;
                }
            }
        }
    }

    /// Clears both tables and resets the prefetch flag.
    pub fn clear_all(&self) {
        self.by_hash.write().clear();
        self.by_number.write().clear();
        self.placeholder_complete.store(false, Ordering::Release);
    }

    /// Whether prefetch has recorded every stored hash.
    ///
    /// Until this is set, a hash miss is inconclusive and the store must be
    /// consulted.
    pub fn is_complete(&self) -> bool {
        self.placeholder_complete.load(Ordering::Acquire)
    }

    /// Marks the placeholder set complete.
    pub fn set_complete(&self) {
        self.placeholder_complete.store(true, Ordering::Release);
    }

    /// Number of resident full entries.
    pub fn full_count(&self) -> usize {
        self.by_hash
            .read()
            .values()
            .filter(|entry| matches!(entry, IndexEntry::Full(_)))
            .count()
    }
}
