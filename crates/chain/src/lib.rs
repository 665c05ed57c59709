//! # lode-chain
//!
//! The chain manager of a lode node: the subsystem that owns the canonical
//! view of the block history, mediates all writes to persistent block
//! storage, keeps a multi-tier in-memory index coherent with that storage,
//! and arbitrates fork choice when new blocks arrive.
//!
//! ## Architecture
//!
//! Every mutation funnels through a single [`ChainActor`] task that owns the
//! peak and drains a command mailbox, so fork-choice decisions are totally
//! ordered. Reads bypass the actor entirely: they walk a per-task MRU, the
//! shared [`BlockIndex`], a process-wide LRU, and finally the persistent
//! [`ChainStore`], promoting on miss.
//!
//! - [`ChainManager`] assembles the pieces, seeds genesis, and spawns the
//!   actor.
//! - [`ChainHandle`] submits commands (synchronously or fire-and-forget).
//! - [`ChainReader`] serves lock-free lookups by hash, number, or tx hash.
//! - [`BlockImporter`] replays externally supplied block ranges.
//! - [`export_blocks`] dumps the main chain into a secondary store.
//! - [`SyncCoordinator`] elects the single foreground synchronizer.

#[macro_use]
extern crate tracing;

mod config;
pub use config::ChainConfig;

mod error;
pub use error::{ChainError, ExportError, ImportError, SourceError, StoreError, ValidationError};

mod index;
pub use index::{BlockIndex, IndexEntry};

mod cache;
pub use cache::{BlockMru, SharedBlockCache};

mod store;
pub use store::{ChainStore, MemoryChainStore};

mod state;
pub use state::{ChainCells, ChainState};

mod events;
pub use events::{ChainEvent, EventBus};

mod outbound;
pub use outbound::{
    AcceptAllValidator, BlockValidator, MempoolSink, MinerHandle, NoopOutbound, Outbound,
    RelaySink, SyncGc, TicketSink,
};

mod fork_choice;
pub use fork_choice::ForkOutcome;

mod reader;
pub use reader::{BlockIter, ChainReader};

mod actor;
pub use actor::{AddOutcome, ChainActor, ChainCommand, ChainHandle};

mod import;
pub use import::BlockImporter;

mod export;
pub use export::{export_blocks, restore_chain_file, write_chain_file, ExportSink};

mod sync;
pub use sync::{SyncCoordinator, SyncLease};

mod manager;
pub use manager::{ChainManager, GenesisSeed};

mod metrics;
pub use self::metrics::describe_chain_metrics;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
