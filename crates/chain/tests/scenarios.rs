//! End-to-end scenarios for the chain manager.

use lode_chain::{
    export_blocks,
    test_utils::{
        recording_outbound, test_config, BlockFactory, FailAtValidator, LinkageValidator,
        MemoryExportSink, RecordingSinks,
    },
    write_chain_file, ChainEvent, ChainManager, ChainStore, GenesisSeed, IndexEntry,
    MemoryChainStore,
};
use lode_protocol::{Block, Transaction};
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;

struct Harness {
    manager: ChainManager,
    factory: BlockFactory,
    seed: GenesisSeed,
    store: Arc<MemoryChainStore>,
    sinks: RecordingSinks,
}

async fn start_chain() -> Harness {
    let mut factory = BlockFactory::new();
    let seed = factory.genesis_seed();
    start_chain_with(factory, seed).await
}

async fn start_chain_with(factory: BlockFactory, seed: GenesisSeed) -> Harness {
    let store = Arc::new(MemoryChainStore::new());
    let (outbound, sinks) = recording_outbound();
    let manager =
        ChainManager::start(test_config(), Arc::clone(&store) as _, outbound, seed.clone())
            .await
            .expect("manager starts");
    Harness { manager, factory, seed, store, sinks }
}

#[tokio::test]
async fn linear_extension_advances_the_peak() {
    let mut h = start_chain().await;
    let handle = h.manager.handle();
    let reader = h.manager.reader();

    let b1 = h.factory.child_of(&h.seed.genesis, 1);
    let outcome = handle.add_block(b1.clone(), true).await.unwrap();

    assert!(outcome.is_added());
    assert_eq!(handle.peak_block().await.unwrap().hash(), b1.hash());
    assert_eq!(reader.block(1).unwrap().unwrap().hash(), b1.hash());
}

#[tokio::test]
async fn duplicate_submission_is_idempotent() {
    let mut h = start_chain().await;
    let handle = h.manager.handle();
    let mut events = h.manager.events().subscribe();

    let b1 = h.factory.child_of(&h.seed.genesis, 1);
    assert!(handle.add_block(b1.clone(), true).await.unwrap().is_added());
    handle.sync().await.unwrap();
    assert!(matches!(events.try_recv(), Ok(ChainEvent::PeakUpdated(_))));

    // Resubmitting reports added, changes nothing, and publishes nothing.
    assert!(handle.add_block(b1.clone(), true).await.unwrap().is_added());
    handle.sync().await.unwrap();

    assert_eq!(handle.peak_block().await.unwrap().hash(), b1.hash());
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn inferior_rival_is_stored_as_alt() {
    let mut h = start_chain().await;
    let handle = h.manager.handle();
    let reader = h.manager.reader();

    let b1 = h.factory.child_of(&h.seed.genesis, 1);
    // Same height, same total difficulty, different hash.
    let b1_rival = h.factory.child_of(&h.seed.genesis, 1);
    assert_ne!(b1.hash(), b1_rival.hash());

    assert!(handle.add_block(b1.clone(), true).await.unwrap().is_added());
    let outcome = handle.add_block(b1_rival.clone(), true).await.unwrap();

    assert!(outcome.is_stored());
    assert_eq!(handle.peak_block().await.unwrap().hash(), b1.hash());
    assert!(matches!(
        reader.index().entry(&b1_rival.hash()),
        Some(IndexEntry::Placeholder)
    ));
    // The alt block is reachable by hash, not by height.
    assert_eq!(reader.block_by_hash(&b1_rival.hash()).unwrap().unwrap().hash(), b1_rival.hash());
    assert_eq!(reader.block(1).unwrap().unwrap().hash(), b1.hash());
}

#[tokio::test]
async fn heavier_branch_triggers_a_reorg() {
    let mut h = start_chain().await;
    let handle = h.manager.handle();
    let reader = h.manager.reader();

    let b1 = h.factory.child_of(&h.seed.genesis, 1);
    let b1_rival = h.factory.child_of(&h.seed.genesis, 1);
    handle.add_block(b1.clone(), true).await.unwrap();
    handle.add_block(b1_rival.clone(), true).await.unwrap();

    // A child of the rival outweighs the incumbent.
    let b2_rival = h.factory.child_of(&b1_rival, 1);
    let outcome = handle.add_block(b2_rival.clone(), true).await.unwrap();

    assert!(outcome.is_added());
    assert_eq!(handle.peak_block().await.unwrap().hash(), b2_rival.hash());
    assert_eq!(reader.block(1).unwrap().unwrap().hash(), b1_rival.hash());
    assert_eq!(reader.block(2).unwrap().unwrap().hash(), b2_rival.hash());
    // The displaced block survives in the store.
    assert_eq!(reader.block_by_hash(&b1.hash()).unwrap().unwrap().hash(), b1.hash());
}

#[tokio::test]
async fn shorter_heavier_branch_reorgs_without_leaking_full_entries() {
    let mut h = start_chain().await;
    let handle = h.manager.handle();
    let reader = h.manager.reader();
    let window = test_config().window;

    // A linear chain one past the window, so the index is at capacity.
    let mut parent = h.seed.genesis.clone();
    let mut blocks = Vec::new();
    for _ in 0..window + 1 {
        let block = h.factory.child_of(&parent, 1);
        handle.add_block(block.clone(), false).await.unwrap();
        blocks.push(block.clone());
        parent = block;
    }

    // A rival at height 2 that outweighs the entire chain.
    let rival = h.factory.child_of(&blocks[0], 100);
    assert!(rival.total_difficulty() > parent.total_difficulty());
    assert!(handle.add_block(rival.clone(), false).await.unwrap().is_added());

    assert_eq!(handle.peak_block().await.unwrap().hash(), rival.hash());
    let index = reader.index();
    assert_eq!(index.hash_at(2), Some(rival.hash()));
    // No height outlives the new peak, and the abandoned suffix holds no
    // resident bodies.
    for number in 3..=window + 1 {
        assert!(index.hash_at(number).is_none(), "height {number} still mapped");
    }
    for block in &blocks[1..] {
        assert!(
            matches!(index.entry(&block.hash()), Some(IndexEntry::Placeholder)),
            "block {} still resident",
            block.number()
        );
    }
    assert!(index.full_count() <= window as usize);
    assert!(reader.block(3).unwrap().is_none());
}

#[tokio::test]
async fn old_main_blocks_degrade_to_placeholders() {
    let mut h = start_chain().await;
    let handle = h.manager.handle();
    let reader = h.manager.reader();
    let window = test_config().window;

    let mut parent = h.seed.genesis.clone();
    let mut blocks = Vec::new();
    for _ in 0..window + 1 {
        let block = h.factory.child_of(&parent, 1);
        handle.add_block(block.clone(), false).await.unwrap();
        blocks.push(block.clone());
        parent = block;
    }

    let index = reader.index();
    // The last `window` blocks stay resident.
    for block in blocks.iter().rev().take(window as usize) {
        assert!(index.full_block(&block.hash()).is_some(), "block {} not full", block.number());
    }
    // The first one has been demoted but keeps its height mapping.
    assert!(matches!(index.entry(&blocks[0].hash()), Some(IndexEntry::Placeholder)));
    assert_eq!(index.hash_at(1), Some(blocks[0].hash()));
    // It is still readable through the store tier.
    assert_eq!(reader.block(1).unwrap().unwrap().hash(), blocks[0].hash());
}

#[tokio::test]
async fn import_skips_known_blocks() {
    let mut h = start_chain().await;
    let handle = h.manager.handle();

    let b1 = h.factory.child_of(&h.seed.genesis, 1);
    let b2 = h.factory.child_of(&b1, 1);
    handle.add_block(b1.clone(), false).await.unwrap();

    // A dump containing the genesis, the installed block, and one new block.
    let source: Vec<Block> = [&h.seed.genesis, &b1, &b2]
        .into_iter()
        .map(|block| Block::from_export(&block.export()).unwrap())
        .collect();

    let importer = h.manager.importer(Arc::new(LinkageValidator));
    let last = importer.import_blocks(source).await.unwrap();

    assert_eq!(last.hash(), b2.hash());
    assert_eq!(handle.peak_block().await.unwrap().hash(), b2.hash());
    assert_eq!(h.store.block(1).unwrap().unwrap().hash(), b1.hash());
}

#[tokio::test]
async fn import_halts_on_validation_failure() {
    let mut h = start_chain().await;
    let handle = h.manager.handle();

    let b1 = h.factory.child_of(&h.seed.genesis, 1);
    let b2 = h.factory.child_of(&b1, 1);
    let b3 = h.factory.child_of(&b2, 1);
    let source: Vec<Block> = [&b1, &b2, &b3]
        .into_iter()
        .map(|block| Block::from_export(&block.export()).unwrap())
        .collect();

    let importer = h.manager.importer(Arc::new(FailAtValidator { fail_at: 2 }));
    let err = importer.import_blocks(source).await.unwrap_err();

    assert!(matches!(err, lode_chain::ImportError::Validation(_)));
    // The prefix before the failure stays installed.
    assert_eq!(handle.peak_block().await.unwrap().hash(), b1.hash());
    assert!(h.store.block(2).unwrap().is_none());
}

#[tokio::test]
async fn import_claims_and_releases_the_sync_slot() {
    let mut h = start_chain().await;
    let mut events = h.manager.events().subscribe();

    let b1 = h.factory.child_of(&h.seed.genesis, 1);
    let source = vec![Block::from_export(&b1.export()).unwrap()];

    let importer = h.manager.importer(Arc::new(LinkageValidator));
    importer.import_blocks(source).await.unwrap();

    assert!(matches!(events.recv().await.unwrap(), ChainEvent::Syncing(true)));
    // The peak update lands between claim and release.
    assert!(matches!(events.recv().await.unwrap(), ChainEvent::PeakUpdated(_)));
    assert!(matches!(events.recv().await.unwrap(), ChainEvent::Syncing(false)));
    assert!(!h.manager.sync_coordinator().is_active());
}

#[tokio::test]
async fn export_then_import_reproduces_the_peak() {
    let mut h = start_chain().await;
    let handle = h.manager.handle();

    let mut parent = h.seed.genesis.clone();
    for _ in 0..4 {
        let block = h.factory.child_of(&parent, 1);
        handle.add_block(block.clone(), false).await.unwrap();
        parent = block;
    }
    let original_peak = handle.peak_block().await.unwrap().hash();

    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("chain.dump");
    let written = write_chain_file(&h.manager.reader(), &dump).unwrap();
    assert_eq!(written, 5);

    // Replay into a fresh chain seeded with the same genesis.
    let fresh = start_chain_with(BlockFactory::new(), h.seed.clone()).await;
    let importer = fresh.manager.importer(Arc::new(LinkageValidator));
    let last = importer.import_file(&dump).await.unwrap();

    assert_eq!(last.hash(), original_peak);
    assert_eq!(fresh.manager.handle().peak_block().await.unwrap().hash(), original_peak);
}

#[tokio::test]
async fn export_chunks_and_resumes() {
    let mut h = start_chain().await;
    let handle = h.manager.handle();
    let reader = h.manager.reader();

    let mut parent = h.seed.genesis.clone();
    for _ in 0..4 {
        let block = h.factory.child_of(&parent, 1);
        handle.add_block(block.clone(), false).await.unwrap();
        parent = block;
    }

    // Heights 0..=4, chunk size 3: one full chunk and one remainder.
    let sink = MemoryExportSink::new();
    let written = export_blocks(&reader, &sink, 3).unwrap();
    assert_eq!(written, 5);
    assert_eq!(sink.chunk_sizes(), vec![3, 2]);
    assert_eq!(sink.row(4).unwrap(), parent.export());

    // Nothing new: the export resumes past everything.
    assert_eq!(export_blocks(&reader, &sink, 3).unwrap(), 0);

    // Two more blocks export incrementally.
    for _ in 0..2 {
        let block = h.factory.child_of(&parent, 1);
        handle.add_block(block.clone(), false).await.unwrap();
        parent = block;
    }
    assert_eq!(export_blocks(&reader, &sink, 3).unwrap(), 2);
    assert_eq!(sink.len(), 7);
}

#[tokio::test]
async fn set_state_rewrites_store_and_state() {
    let mut h = start_chain().await;
    let handle = h.manager.handle();
    let reader = h.manager.reader();

    // Drive the live chain one way.
    let b1 = h.factory.child_of(&h.seed.genesis, 1);
    handle.add_block(b1.clone(), false).await.unwrap();

    // Then replace everything with an unrelated two-block chain.
    let mut other = BlockFactory::new();
    let other_seed = other.genesis_seed();
    let c1 = other.child_of(&other_seed.genesis, 2);
    let c2 = other.child_of(&c1, 2);
    let blocks =
        vec![other_seed.parent.clone(), other_seed.genesis.clone(), c1.clone(), c2.clone()];

    handle.set_state(c2.clone(), blocks).await.unwrap();

    assert_eq!(handle.peak_block().await.unwrap().hash(), c2.hash());
    assert_eq!(h.store.peak_block().unwrap().unwrap().hash(), c2.hash());
    assert_eq!(reader.block(1).unwrap().unwrap().hash(), c1.hash());
    assert!(reader.block_by_hash(&b1.hash()).unwrap().is_none());
}

#[tokio::test]
async fn reset_state_restores_the_genesis_chain() {
    let mut h = start_chain().await;
    let handle = h.manager.handle();

    let b1 = h.factory.child_of(&h.seed.genesis, 1);
    handle.add_block(b1, false).await.unwrap();

    handle.reset_state().await.unwrap();

    assert_eq!(handle.peak_block().await.unwrap().hash(), h.seed.genesis.hash());
    assert!(h.store.block(1).unwrap().is_none());
}

#[tokio::test]
async fn rejected_blocks_never_reach_the_actor() {
    let mut h = start_chain().await;
    let handle = h.manager.handle();

    // No executed state.
    let bare = Block::from_export(&h.factory.child_of(&h.seed.genesis, 1).export()).unwrap();
    let outcome = handle.add_block(bare, true).await.unwrap();
    assert!(matches!(outcome, lode_chain::AddOutcome::Rejected(_)));

    // Height zero after genesis.
    let zero = h.seed.genesis.clone();
    let outcome = handle.add_block(zero, true).await.unwrap();
    assert!(matches!(outcome, lode_chain::AddOutcome::Rejected(_)));

    assert_eq!(handle.peak_block().await.unwrap().hash(), h.seed.genesis.hash());
}

#[tokio::test]
async fn adoption_side_effects_fire() {
    let mut h = start_chain().await;
    let handle = h.manager.handle();

    let tx = Transaction { nonce: 1, ..Default::default() };
    let b1 = h.factory.child_with_txs(&h.seed.genesis, 1, vec![tx.clone()]);
    handle.add_block(b1.clone(), true).await.unwrap();
    handle.sync().await.unwrap();

    // Mempool pruned, miner nudged, tickets notified, payload broadcast
    // (the block's miner matches this node's zero-address miner identity).
    assert!(h.sinks.mempool.removed.lock().contains(&tx.hash()));
    assert!(h.sinks.miner.updates() >= 1);
    assert!(!h.sinks.tickets.epochs.lock().is_empty());
    assert_eq!(h.sinks.relay.broadcasts.lock().len(), 1);
    assert!(h.sinks.relay.relays.lock().is_empty());
}

#[tokio::test]
async fn async_submission_applies_after_a_fence() {
    let mut h = start_chain().await;
    let handle = h.manager.handle();

    let b1 = h.factory.child_of(&h.seed.genesis, 1);
    handle.add_block_async(b1.clone(), false).await.unwrap();
    handle.sync().await.unwrap();

    assert_eq!(handle.peak_block().await.unwrap().hash(), b1.hash());
}

#[tokio::test]
async fn final_block_trails_the_peak() {
    let mut h = start_chain().await;
    let handle = h.manager.handle();

    // finality_depth in the test config is the production default (100),
    // far deeper than this chain, so the final block clamps to genesis.
    let b1 = h.factory.child_of(&h.seed.genesis, 1);
    handle.add_block(b1, false).await.unwrap();

    let final_block = handle.final_block().await.unwrap().unwrap();
    assert_eq!(final_block.hash(), h.seed.genesis.hash());
}

#[tokio::test]
async fn restart_rebuilds_the_index_from_the_store() {
    let mut h = start_chain().await;
    let handle = h.manager.handle();

    let mut parent = h.seed.genesis.clone();
    for _ in 0..3 {
        let block = h.factory.child_of(&parent, 1);
        handle.add_block(block.clone(), false).await.unwrap();
        parent = block;
    }
    h.manager.shutdown().await.unwrap();

    // A new manager over the same store sees the same chain.
    let (outbound, _) = recording_outbound();
    let manager =
        ChainManager::start(test_config(), Arc::clone(&h.store) as _, outbound, h.seed.clone())
            .await
            .unwrap();

    assert_eq!(manager.handle().peak_block().await.unwrap().hash(), parent.hash());
    assert_eq!(manager.reader().block(3).unwrap().unwrap().hash(), parent.hash());
    assert!(manager.reader().index().is_complete());
}
