//! Assembly of the chain manager.

use crate::{
    actor::{ChainActor, ChainCommand},
    BlockImporter, BlockIndex, BlockValidator, ChainCells, ChainConfig, ChainError, ChainHandle,
    ChainReader, ChainState, ChainStore, EventBus, Outbound, SharedBlockCache, StoreError,
    SyncCoordinator,
};
use lode_protocol::Block;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// The genesis chain a fresh store is seeded with.
///
/// The parent is stored as an alt row — reachable by hash for ancestry
/// walks, never mapped to a height — and the genesis block becomes the
/// first peak.
#[derive(Debug, Clone)]
pub struct GenesisSeed {
    /// Stub predecessor of the genesis block.
    pub parent: Block,
    /// The genesis block itself.
    pub genesis: Block,
}

/// The assembled chain manager.
///
/// Owns the actor task. Hand out [`ChainHandle`]s for mutation and
/// [`ChainReader`]s for lock-free reads; drop or [`ChainManager::shutdown`]
/// to stop.
#[derive(Debug)]
pub struct ChainManager {
    config: Arc<ChainConfig>,
    handle: ChainHandle,
    reader: ChainReader,
    events: EventBus,
    sync: Arc<SyncCoordinator>,
    cancellation: CancellationToken,
    actor_task: tokio::task::JoinHandle<Result<(), ChainError>>,
}

impl ChainManager {
    /// Boots the chain manager on the given store.
    ///
    /// Seeds the genesis chain when the store is empty, rebuilds the block
    /// index from the store, and spawns the actor task.
    pub async fn start(
        config: ChainConfig,
        store: Arc<dyn ChainStore>,
        outbound: Outbound,
        seed: GenesisSeed,
    ) -> Result<Self, ChainError> {
        let config = Arc::new(config);

        let peak = match store.peak_block()? {
            Some(peak) => Arc::new(peak),
            None => {
                info!(
                    target: "chain",
                    genesis = %seed.genesis.hash(),
                    "Empty store, seeding genesis"
                );
                store.truncate_blocks()?;
                store.put_new_block(&seed.parent)?;
                store.put_peak(&seed.genesis)?;
                Arc::new(seed.genesis.clone())
            }
        };

        let index = Arc::new(BlockIndex::new());
        prefetch(&index, store.as_ref(), config.window)?;

        let cells = Arc::new(ChainCells::new());
        cells.publish(peak.epoch(config.epoch_length), peak.number());

        let cache = Arc::new(SharedBlockCache::new(config.shared_cache_capacity));
        let events = EventBus::new();
        let (peak_tx, peak_rx) = watch::channel(Arc::clone(&peak));
        let (cmd_tx, cmd_rx) = mpsc::channel::<ChainCommand>(config.mailbox_capacity);
        let cancellation = CancellationToken::new();

        let sync = Arc::new(SyncCoordinator::new(
            events.clone(),
            Arc::clone(&cells),
            Arc::clone(&outbound.sync_gc),
            config.sync_throttle,
        ));

        let reader = ChainReader::new(
            Arc::clone(&store),
            Arc::clone(&index),
            cache,
            Arc::clone(&cells),
            peak_rx,
        );
        let handle =
            ChainHandle::new(cmd_tx, Arc::clone(&index), Arc::clone(&cells), Arc::clone(&config));

        let actor = ChainActor::new(
            ChainState::new(peak),
            store,
            index,
            cells,
            events.clone(),
            outbound,
            Arc::clone(&config),
            (seed.parent, seed.genesis),
            peak_tx,
            cmd_rx,
            cancellation.clone(),
        );
        let actor_task = tokio::spawn(actor.start());

        Ok(Self { config, handle, reader, events, sync, cancellation, actor_task })
    }

    /// Returns a handle for submitting commands to the actor.
    pub fn handle(&self) -> ChainHandle {
        self.handle.clone()
    }

    /// Returns a reader over the canonical chain.
    pub fn reader(&self) -> ChainReader {
        self.reader.clone()
    }

    /// Returns the event bus.
    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// Returns the sync coordinator.
    pub fn sync_coordinator(&self) -> Arc<SyncCoordinator> {
        Arc::clone(&self.sync)
    }

    /// Builds an importer that validates through the given validator.
    pub fn importer(&self, validator: Arc<dyn BlockValidator>) -> BlockImporter {
        BlockImporter::new(
            self.handle(),
            self.reader(),
            validator,
            Arc::clone(&self.sync),
            self.config.task_cache_capacity,
        )
    }

    /// Stops the actor and waits for it to exit.
    pub async fn shutdown(self) -> Result<(), ChainError> {
        self.cancellation.cancel();
        match self.actor_task.await {
            Ok(result) => result,
            Err(err) => {
                error!(target: "chain", %err, "Chain actor task failed to join");
                Err(ChainError::ChannelClosed)
            }
        }
    }
}

/// Rebuilds the block index from the store.
///
/// Walks the main chain from the persisted peak, mapping every height and
/// keeping the top `window` blocks resident, then records a placeholder for
/// every other known hash. Marks the index complete at the end; this is the
/// authoritative repair path after a store failure.
pub(crate) fn prefetch(
    index: &BlockIndex,
    store: &dyn ChainStore,
    window: u64,
) -> Result<(), StoreError> {
    let Some(peak) = store.peak_block()? else {
        index.set_complete();
        return Ok(());
    };

    let full_floor = peak.number().saturating_sub(window.saturating_sub(1));
    let mut cursor = Some(peak.hash());
    while let Some(cursor_hash) = cursor.take() {
        let batch = store.blocks_by_hash(&cursor_hash, 100)?;
        let Some(last) = batch.last() else { break };
        if last.number() > 0 {
            cursor = Some(last.parent_hash());
        }
        for block in batch {
            index.put_number(block.number(), block.hash());
            if block.number() >= full_floor {
                index.put_full(Arc::new(block));
            } else {
                index.put_placeholder(block.hash());
            }
        }
    }

    for (hash, _) in store.all_block_hashes()? {
        index.note_known(hash);
    }
    index.set_complete();

    debug!(
        target: "chain",
        full_entries = index.full_count(),
        peak = peak.number(),
        "Prefetched block index"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryChainStore;
    use crate::test_utils::BlockFactory;

    #[test]
    fn prefetch_windows_the_main_chain() {
        let store = MemoryChainStore::new();
        let mut factory = BlockFactory::new();
        let seed = factory.genesis_seed();
        store.put_new_block(&seed.parent).unwrap();
        store.put_peak(&seed.genesis).unwrap();

        let mut parent = seed.genesis.clone();
        for _ in 0..6 {
            let block = factory.child_of(&parent, 1);
            store.put_block(&block).unwrap();
            parent = block;
        }

        let index = BlockIndex::new();
        prefetch(&index, &store, 3).unwrap();

        assert!(index.is_complete());
        // Heights 4..=6 resident, the rest placeholders, all mapped.
        for n in 0..=6 {
            assert!(index.hash_at(n).is_some(), "height {n} unmapped");
        }
        assert_eq!(index.full_count(), 3);
        assert!(index.full_at(6).is_some());
        assert!(index.full_at(3).is_none());
        // The genesis parent stub is known by hash only.
        assert!(index.contains(&seed.parent.hash()));
    }

    #[test]
    fn prefetch_of_an_empty_store_just_completes() {
        let index = BlockIndex::new();
        prefetch(&index, &MemoryChainStore::new(), 1000).unwrap();
        assert!(index.is_complete());
        assert_eq!(index.full_count(), 0);
    }
}
