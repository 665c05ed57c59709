//! Error types for the chain manager.

use alloy_primitives::B256;
use thiserror::Error;

/// A dynamic error type for encapsulating low-level backend errors.
///
/// Used as the source for most [`StoreError`] variants so that different
/// store backends can be wrapped uniformly.
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that may occur while interacting with persistent block storage.
///
/// This enum is shared by all implementations of [`crate::ChainStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to initialize the underlying database environment or schema.
    #[error("store initialization failed")]
    Init(#[source] SourceError),

    /// Failed to read from the store.
    #[error("store read failed")]
    Read(#[source] SourceError),

    /// Failed to write to the store.
    #[error("store write failed")]
    Write(#[source] SourceError),

    /// The expected entry was not found.
    #[error("entry not found: {0}")]
    EntryNotFound(String),
}

/// Errors returned by the external block validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("block {hash} at height {number} failed validation: {reason}")]
pub struct ValidationError {
    /// Hash of the rejected block.
    pub hash: B256,
    /// Height of the rejected block.
    pub number: u64,
    /// Validator-supplied description.
    pub reason: String,
}

/// Errors surfaced by [`crate::ChainHandle`] operations.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The block lacks executed state; the caller must validate first.
    #[error("block {0} has no executed state")]
    MissingState(B256),

    /// The block claims a height below 1 on a seeded chain.
    #[error("block {hash} has invalid post-genesis height {number}")]
    InvalidGenesis {
        /// Hash of the offending block.
        hash: B256,
        /// Claimed height.
        number: u64,
    },

    /// The synchronous call budget was exceeded.
    #[error("chain actor call timed out")]
    Timeout,

    /// The actor mailbox is gone; the manager has shut down.
    #[error("chain actor channel closed")]
    ChannelClosed,

    /// The persistent store failed mid-operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by [`crate::BlockImporter`].
#[derive(Debug, Error)]
pub enum ImportError {
    /// The source contained no blocks to import.
    #[error("import source is empty")]
    EmptySource,

    /// A block failed external validation; the import halts here.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Submitting a validated block to the actor failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Reading the source failed.
    #[error(transparent)]
    Codec(#[from] lode_protocol::CodecError),
}

/// Errors surfaced by the exporter.
#[derive(Debug, Error)]
pub enum ExportError {
    /// A chunk transaction failed in the secondary store.
    #[error("export sink rejected a chunk")]
    Sink(#[source] SourceError),

    /// Reading the main chain failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Writing the framed stream failed.
    #[error(transparent)]
    Codec(#[from] lode_protocol::CodecError),
}
