//! Fork choice and canonical index refetch.
//!
//! Given a verified candidate and the current peak, [`classify`] decides
//! which of the four §fork outcomes applies; the actor then persists
//! accordingly and, on a peak change away from the simple extension case,
//! [`refetch_canonical`] walks the new branch rewriting the index until it
//! agrees with the store again.

use crate::{BlockIndex, ChainStore, StoreError};
use lode_protocol::Block;
use std::sync::Arc;

/// The fork-choice decision for an incoming block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkOutcome {
    /// The block is already installed; nothing to do.
    Duplicate,
    /// The block extends a non-canonical branch and is not heavy enough to
    /// displace the peak.
    AltExtension,
    /// The block is a child of the current peak.
    MainExtension,
    /// The block is heavier than the peak and sits on another branch; the
    /// main chain is rewritten beneath it.
    Reorg,
}

/// Classifies an incoming block against the current peak.
///
/// A rival with total difficulty equal to the peak's never displaces it;
/// the incumbent wins ties.
pub(crate) fn classify(index: &BlockIndex, peak: &Block, block: &Block) -> ForkOutcome {
    if index.full_block(&block.hash()).is_some() {
        return ForkOutcome::Duplicate;
    }
    if block.parent_hash() == peak.hash() {
        return ForkOutcome::MainExtension;
    }
    if block.total_difficulty() > peak.total_difficulty() {
        return ForkOutcome::Reorg;
    }
    ForkOutcome::AltExtension
}

/// Rewrites the block index along the branch ending at `tip`.
///
/// Walks parent pointers from `tip`, installing `number → hash` mappings and
/// full entries (placeholders beyond the retention window), until a height
/// already maps to the hash on this branch — the common ancestor with the
/// previous main chain. Displaced hashes are demoted to placeholders so alt
/// blocks never retain a resident body.
pub(crate) fn refetch_canonical(
    index: &BlockIndex,
    store: &dyn ChainStore,
    tip: Arc<Block>,
    window: u64,
) -> Result<(), StoreError> {
    index.truncate_numbers_above(tip.number());
    let full_floor = tip.number().saturating_sub(window.saturating_sub(1));

    let mut cursor = tip;
    loop {
        let number = cursor.number();
        let hash = cursor.hash();
        if index.hash_at(number) == Some(hash) {
            break;
        }

        if let Some(displaced) = index.hash_at(number) {
            index.put_placeholder(displaced);
        }
        index.put_number(number, hash);
        if number >= full_floor {
            index.put_full(Arc::clone(&cursor));
        } else {
            index.put_placeholder(hash);
        }

        if number == 0 {
            break;
        }
        match store.block_by_hash(&cursor.parent_hash())? {
            Some(parent) => cursor = Arc::new(parent),
            None => break,
        }
    }
    Ok(())
}
