//! # lode-protocol
//!
//! Block primitives for the lode chain: headers, transactions, receipts, and
//! the framed record codec used for bulk export and replay.
//!
//! The types here are deliberately small. Consensus validation and state
//! execution live elsewhere; this crate only defines the data a chain manager
//! needs to index, persist, and relay blocks.

mod block;
pub use block::{Block, BlockHeader, BlockState};

mod transaction;
pub use transaction::{Receipt, Transaction};

mod codec;
pub use codec::{CodecError, FramedReader, FramedWriter};
