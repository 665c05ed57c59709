//! Block and header types.

use crate::{Receipt, Transaction};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

/// A block header.
///
/// The `state_root` is the commitment produced by executing the block; the
/// executed state itself travels separately as [`BlockState`] and is never
/// part of the wire encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct BlockHeader {
    /// Hash of the parent block.
    pub parent_hash: B256,
    /// Height of this block.
    pub number: u64,
    /// Unix timestamp the block was sealed at.
    pub timestamp: u64,
    /// Address of the miner that sealed the block.
    pub miner: Address,
    /// Commitment to the post-execution state.
    pub state_root: B256,
    /// Commitment to the transaction list.
    pub transactions_root: B256,
    /// Accumulated proof-of-work over this block's ancestry, including itself.
    pub total_difficulty: U256,
    /// Gas ceiling for the block.
    pub gas_limit: u64,
    /// Gas consumed by the block's transactions.
    pub gas_used: u64,
    /// Proof-of-work nonce.
    pub nonce: u64,
}

impl BlockHeader {
    /// Computes the block hash: keccak over the RLP encoding of the header.
    pub fn compute_hash(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }
}

/// The executed state attached to a verified block.
///
/// Opaque to the chain manager. Produced by the external validator, consumed
/// by whoever materializes account state. A block that carries one is
/// considered executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockState(pub Bytes);

/// Wire shape of a block: what [`Block::export`] encodes.
///
/// The executed state is intentionally absent. Replaying an export re-derives
/// it through validation.
#[derive(RlpEncodable, RlpDecodable)]
struct RawBlock {
    header: BlockHeader,
    transactions: Vec<Transaction>,
    receipts: Vec<Receipt>,
}

/// A sealed block.
///
/// The hash is computed once at construction and never recomputed; all
/// equality and index operations downstream rely on it being stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    header: BlockHeader,
    transactions: Vec<Transaction>,
    receipts: Vec<Receipt>,
    state: Option<BlockState>,
    hash: B256,
}

impl Block {
    /// Seals a new block from its parts.
    pub fn new(
        header: BlockHeader,
        transactions: Vec<Transaction>,
        receipts: Vec<Receipt>,
    ) -> Self {
        let hash = header.compute_hash();
        Self { header, transactions, receipts, state: None, hash }
    }

    /// Returns the sealed block hash.
    pub const fn hash(&self) -> B256 {
        self.hash
    }

    /// Returns the block height.
    pub const fn number(&self) -> u64 {
        self.header.number
    }

    /// Returns the parent block hash.
    pub const fn parent_hash(&self) -> B256 {
        self.header.parent_hash
    }

    /// Returns the accumulated difficulty up to and including this block.
    pub const fn total_difficulty(&self) -> U256 {
        self.header.total_difficulty
    }

    /// Returns the miner that sealed this block.
    pub const fn miner(&self) -> Address {
        self.header.miner
    }

    /// Returns the epoch this block falls in, for the given epoch length.
    ///
    /// `epoch_length` must be non-zero.
    pub const fn epoch(&self, epoch_length: u64) -> u64 {
        self.header.number / epoch_length
    }

    /// Returns the header.
    pub const fn header(&self) -> &BlockHeader {
        &self.header
    }

    /// Returns the block's transactions.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Returns the block's receipts.
    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    /// Whether the block carries its executed state.
    pub const fn has_state(&self) -> bool {
        self.state.is_some()
    }

    /// Returns the executed state, if attached.
    pub const fn state(&self) -> Option<&BlockState> {
        self.state.as_ref()
    }

    /// Attaches executed state, marking the block verified.
    pub fn with_state(mut self, state: BlockState) -> Self {
        self.state = Some(state);
        self
    }

    /// Strips the executed state.
    pub fn without_state(mut self) -> Self {
        self.state = None;
        self
    }

    /// Serializes the block for export or relay.
    ///
    /// The executed state is not included; see [`RawBlock`].
    pub fn export(&self) -> Bytes {
        let raw = RawBlock {
            header: self.header.clone(),
            transactions: self.transactions.clone(),
            receipts: self.receipts.clone(),
        };
        alloy_rlp::encode(&raw).into()
    }

    /// Decodes a block previously produced by [`Block::export`].
    ///
    /// The decoded block carries no executed state.
    pub fn from_export(mut bytes: &[u8]) -> Result<Self, alloy_rlp::Error> {
        let raw = <RawBlock as alloy_rlp::Decodable>::decode(&mut bytes)?;
        Ok(Self::new(raw.header, raw.transactions, raw.receipts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn sample_block() -> Block {
        let header = BlockHeader {
            parent_hash: B256::repeat_byte(0x01),
            number: 7,
            timestamp: 1_700_000_000,
            miner: address!("00000000000000000000000000000000000000aa"),
            state_root: B256::repeat_byte(0x02),
            transactions_root: B256::repeat_byte(0x03),
            total_difficulty: U256::from(42u64),
            gas_limit: 20_000_000,
            gas_used: 400_000,
            nonce: 9,
        };
        let tx = Transaction {
            nonce: 0,
            gas_price: U256::ZERO,
            gas_limit: 200_000,
            to: Address::ZERO,
            value: U256::from(5u64),
            payload: Bytes::from_static(b"payload"),
        };
        let receipt = Receipt { tx_hash: tx.hash(), gas_used: 200_000, success: true };
        Block::new(header, vec![tx], vec![receipt])
    }

    #[test]
    fn hash_is_sealed_at_construction() {
        let block = sample_block();
        assert_eq!(block.hash(), block.header().compute_hash());
    }

    #[test]
    fn export_round_trips_without_state() {
        let block = sample_block().with_state(BlockState(Bytes::from_static(b"state")));
        let decoded = Block::from_export(&block.export()).expect("decodable");

        assert_eq!(decoded.hash(), block.hash());
        assert_eq!(decoded.number(), block.number());
        assert_eq!(decoded.transactions(), block.transactions());
        assert_eq!(decoded.receipts(), block.receipts());
        assert!(!decoded.has_state());
    }

    #[test]
    fn epoch_is_number_over_length() {
        let block = sample_block();
        assert_eq!(block.epoch(4), 1);
        assert_eq!(block.epoch(40_320), 0);
    }
}
