//! Test utilities for the chain manager.
//!
//! Deterministic block factories and recording collaborators, shared by the
//! unit tests and the integration suite.

use crate::{
    BlockValidator, ChainConfig, ExportSink, GenesisSeed, MempoolSink, MinerHandle, Outbound,
    RelaySink, SourceError, SyncGc, TicketSink, ValidationError,
};
use alloy_primitives::{Bytes, B256, U256};
use lode_protocol::{Block, BlockHeader, BlockState, Transaction};
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// Builds deterministic, properly linked chains of verified blocks.
///
/// Sibling blocks are disambiguated by a per-factory nonce, so two children
/// of the same parent always hash differently.
#[derive(Debug, Default)]
pub struct BlockFactory {
    salt: u64,
}

impl BlockFactory {
    /// Creates a factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the genesis seed: a parent stub and a genesis block at height
    /// zero with total difficulty one.
    pub fn genesis_seed(&mut self) -> GenesisSeed {
        let parent = Block::new(
            BlockHeader { number: 0, nonce: self.next_salt(), ..Default::default() },
            vec![],
            vec![],
        );
        let genesis = Block::new(
            BlockHeader {
                parent_hash: parent.hash(),
                number: 0,
                timestamp: 1_700_000_000,
                total_difficulty: U256::from(1u64),
                nonce: self.next_salt(),
                ..Default::default()
            },
            vec![],
            vec![],
        )
        .with_state(BlockState(Bytes::from_static(b"genesis state")));
        GenesisSeed { parent, genesis }
    }

    /// Builds a verified child of `parent`, one higher and `td_delta`
    /// heavier.
    pub fn child_of(&mut self, parent: &Block, td_delta: u64) -> Block {
        self.child_with_txs(parent, td_delta, vec![])
    }

    /// Builds a verified child carrying the given transactions.
    pub fn child_with_txs(
        &mut self,
        parent: &Block,
        td_delta: u64,
        transactions: Vec<Transaction>,
    ) -> Block {
        let header = BlockHeader {
            parent_hash: parent.hash(),
            number: parent.number() + 1,
            timestamp: parent.header().timestamp + 15,
            total_difficulty: parent.total_difficulty() + U256::from(td_delta),
            nonce: self.next_salt(),
            ..Default::default()
        };
        Block::new(header, transactions, vec![])
            .with_state(BlockState(Bytes::from_static(b"executed")))
    }

    fn next_salt(&mut self) -> u64 {
        self.salt += 1;
        self.salt
    }
}

/// A relay sink that records every payload it receives.
#[derive(Debug, Default)]
pub struct RecordingRelay {
    /// Payloads sent through `broadcast`.
    pub broadcasts: Mutex<Vec<Bytes>>,
    /// Payloads sent through `relay`.
    pub relays: Mutex<Vec<Bytes>>,
}

impl RelaySink for RecordingRelay {
    fn broadcast(&self, payload: Bytes) {
        self.broadcasts.lock().push(payload);
    }

    fn relay(&self, payload: Bytes) {
        self.relays.lock().push(payload);
    }
}

/// A mempool that records pruned transaction hashes.
#[derive(Debug, Default)]
pub struct RecordingMempool {
    /// Hashes removed so far.
    pub removed: Mutex<Vec<B256>>,
}

impl MempoolSink for RecordingMempool {
    fn remove_transactions(&self, tx_hashes: &[B256]) {
        self.removed.lock().extend_from_slice(tx_hashes);
    }
}

/// A ticket sink that records notified epochs.
#[derive(Debug, Default)]
pub struct RecordingTickets {
    /// Epochs notified so far.
    pub epochs: Mutex<Vec<u64>>,
}

impl TicketSink for RecordingTickets {
    fn peak_changed(&self, epoch: u64) {
        self.epochs.lock().push(epoch);
    }
}

/// A miner handle that counts update signals.
#[derive(Debug, Default)]
pub struct CountingMiner {
    updates: AtomicU64,
}

impl CountingMiner {
    /// Number of update signals received.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

impl MinerHandle for CountingMiner {
    fn update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }
}

/// A sync metadata collector that records its prune horizon.
#[derive(Debug, Default)]
pub struct RecordingGc {
    /// Heights passed to `collect_below`.
    pub collected_below: Mutex<Vec<u64>>,
}

impl SyncGc for RecordingGc {
    fn collect_below(&self, number: u64) {
        self.collected_below.lock().push(number);
    }
}

/// Shared handles to the sinks inside a recording [`Outbound`].
#[derive(Debug)]
pub struct RecordingSinks {
    /// The relay sink.
    pub relay: Arc<RecordingRelay>,
    /// The mempool sink.
    pub mempool: Arc<RecordingMempool>,
    /// The ticket sink.
    pub tickets: Arc<RecordingTickets>,
    /// The miner handle.
    pub miner: Arc<CountingMiner>,
    /// The sync metadata collector.
    pub sync_gc: Arc<RecordingGc>,
}

/// Builds an [`Outbound`] whose collaborators record everything.
pub fn recording_outbound() -> (Outbound, RecordingSinks) {
    let sinks = RecordingSinks {
        relay: Arc::new(RecordingRelay::default()),
        mempool: Arc::new(RecordingMempool::default()),
        tickets: Arc::new(RecordingTickets::default()),
        miner: Arc::new(CountingMiner::default()),
        sync_gc: Arc::new(RecordingGc::default()),
    };
    let outbound = Outbound {
        relay: Arc::clone(&sinks.relay) as _,
        mempool: Arc::clone(&sinks.mempool) as _,
        tickets: Arc::clone(&sinks.tickets) as _,
        miner: Arc::clone(&sinks.miner) as _,
        sync_gc: Arc::clone(&sinks.sync_gc) as _,
    };
    (outbound, sinks)
}

/// A validator that checks parent linkage and stamps executed state.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkageValidator;

impl BlockValidator for LinkageValidator {
    fn validate(&self, block: Block, parent: Option<&Block>) -> Result<Block, ValidationError> {
        if let Some(parent) = parent {
            if block.parent_hash() != parent.hash() {
                return Err(ValidationError {
                    hash: block.hash(),
                    number: block.number(),
                    reason: "parent hash mismatch".to_string(),
                });
            }
        }
        Ok(block.with_state(BlockState(Bytes::from_static(b"validated"))))
    }
}

/// A validator that rejects blocks at one height and accepts the rest.
#[derive(Debug, Clone, Copy)]
pub struct FailAtValidator {
    /// The height to reject.
    pub fail_at: u64,
}

impl BlockValidator for FailAtValidator {
    fn validate(&self, block: Block, _parent: Option<&Block>) -> Result<Block, ValidationError> {
        if block.number() == self.fail_at {
            return Err(ValidationError {
                hash: block.hash(),
                number: block.number(),
                reason: "rejected by test validator".to_string(),
            });
        }
        Ok(block.with_state(BlockState(Bytes::from_static(b"validated"))))
    }
}

/// An export sink over a plain map, recording chunk boundaries.
#[derive(Debug, Default)]
pub struct MemoryExportSink {
    rows: Mutex<BTreeMap<u64, Bytes>>,
    chunks: Mutex<Vec<usize>>,
}

impl MemoryExportSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows recorded.
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    /// Whether the sink is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    /// The recorded chunk sizes, in arrival order.
    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.chunks.lock().clone()
    }

    /// Returns the payload stored at the given height.
    pub fn row(&self, number: u64) -> Option<Bytes> {
        self.rows.lock().get(&number).cloned()
    }
}

impl ExportSink for MemoryExportSink {
    fn last_number(&self) -> Result<Option<u64>, SourceError> {
        Ok(self.rows.lock().keys().next_back().copied())
    }

    fn write_chunk(&self, rows: &[(u64, Bytes)]) -> Result<(), SourceError> {
        let mut table = self.rows.lock();
        for (number, payload) in rows {
            table.insert(*number, payload.clone());
        }
        self.chunks.lock().push(rows.len());
        Ok(())
    }
}

/// A compact configuration for tests: tiny window and caches, dev epochs.
pub fn test_config() -> ChainConfig {
    ChainConfig {
        window: 5,
        task_cache_capacity: 4,
        shared_cache_capacity: 16,
        export_chunk_size: 3,
        ..ChainConfig::dev()
    }
}
