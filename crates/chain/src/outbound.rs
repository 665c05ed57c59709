//! Seams to the chain manager's external collaborators.
//!
//! Everything the manager calls out to — validation, relaying, the mempool,
//! the ticket subsystem, the miner — is reached through these traits. The
//! no-op implementations let the manager run standalone and keep tests free
//! of wiring.

use crate::ValidationError;
use alloy_primitives::{Bytes, B256};
use lode_protocol::Block;
use std::{fmt::Debug, sync::Arc};

/// The external block validator.
///
/// A black box to the chain manager: given a candidate and its parent it
/// either returns the verified block, executed state attached, or an error
/// describing the rejection.
pub trait BlockValidator: Send + Sync + Debug {
    /// Validates `block` against `parent`, returning the verified block.
    fn validate(&self, block: Block, parent: Option<&Block>) -> Result<Block, ValidationError>;
}

/// The peer-network relay sink.
pub trait RelaySink: Send + Sync + Debug {
    /// Announces a self-mined block to all peers.
    fn broadcast(&self, payload: Bytes);

    /// Forwards a foreign block onward.
    fn relay(&self, payload: Bytes);
}

/// The local transaction pool.
pub trait MempoolSink: Send + Sync + Debug {
    /// Drops the given transactions; they are now included in a main block.
    fn remove_transactions(&self, tx_hashes: &[B256]);
}

/// The ticket subsystem notification sink.
pub trait TicketSink: Send + Sync + Debug {
    /// Signals that the peak moved into the given epoch. Calls are debounced
    /// by the actor.
    fn peak_changed(&self, epoch: u64);
}

/// The mining worker control handle.
pub trait MinerHandle: Send + Sync + Debug {
    /// Asks the worker to rebase its candidate on the new peak.
    fn update(&self);
}

/// Garbage collection of sync metadata.
pub trait SyncGc: Send + Sync + Debug {
    /// Collects sync bookkeeping below the given height.
    fn collect_below(&self, number: u64);
}

/// The bundle of collaborator handles the actor carries.
#[derive(Debug, Clone)]
pub struct Outbound {
    /// Relay sink for freshly adopted blocks.
    pub relay: Arc<dyn RelaySink>,
    /// Mempool to prune after main-chain adoption.
    pub mempool: Arc<dyn MempoolSink>,
    /// Ticket subsystem to nudge after peak changes.
    pub tickets: Arc<dyn TicketSink>,
    /// Miner worker to rebase after peak changes.
    pub miner: Arc<dyn MinerHandle>,
    /// Sync metadata collector.
    pub sync_gc: Arc<dyn SyncGc>,
}

impl Outbound {
    /// A bundle of no-op collaborators.
    pub fn noop() -> Self {
        let noop = Arc::new(NoopOutbound);
        Self {
            relay: Arc::clone(&noop) as Arc<dyn RelaySink>,
            mempool: Arc::clone(&noop) as Arc<dyn MempoolSink>,
            tickets: Arc::clone(&noop) as Arc<dyn TicketSink>,
            miner: Arc::clone(&noop) as Arc<dyn MinerHandle>,
            sync_gc: noop as Arc<dyn SyncGc>,
        }
    }
}

/// A collaborator that does nothing, for standalone operation and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOutbound;

impl RelaySink for NoopOutbound {
    fn broadcast(&self, _payload: Bytes) {}
    fn relay(&self, _payload: Bytes) {}
}

impl MempoolSink for NoopOutbound {
    fn remove_transactions(&self, _tx_hashes: &[B256]) {}
}

impl TicketSink for NoopOutbound {
    fn peak_changed(&self, _epoch: u64) {}
}

impl MinerHandle for NoopOutbound {
    fn update(&self) {}
}

impl SyncGc for NoopOutbound {
    fn collect_below(&self, _number: u64) {}
}

/// A validator that accepts every block as-is.
///
/// Only meaningful for wiring where blocks already carry state.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllValidator;

impl BlockValidator for AcceptAllValidator {
    fn validate(&self, block: Block, _parent: Option<&Block>) -> Result<Block, ValidationError> {
        Ok(block)
    }
}
