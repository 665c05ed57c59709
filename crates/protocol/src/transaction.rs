//! Transaction and receipt types.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

/// A transaction as the chain manager sees it.
///
/// Execution semantics are out of scope; the manager only needs stable
/// hashing for lookup and mempool pruning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct Transaction {
    /// Sender nonce.
    pub nonce: u64,
    /// Price per unit of gas.
    pub gas_price: U256,
    /// Gas ceiling for this transaction.
    pub gas_limit: u64,
    /// Recipient. [`Address::ZERO`] denotes contract creation.
    pub to: Address,
    /// Value transferred.
    pub value: U256,
    /// Call data.
    pub payload: Bytes,
}

impl Transaction {
    /// Computes the transaction hash: keccak over the RLP encoding.
    pub fn hash(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }
}

/// Outcome of executing a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct Receipt {
    /// Hash of the transaction this receipt belongs to.
    pub tx_hash: B256,
    /// Gas consumed.
    pub gas_used: u64,
    /// Whether execution succeeded.
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_across_clones() {
        let tx = Transaction {
            nonce: 3,
            gas_price: U256::from(1u64),
            gas_limit: 21_000,
            to: Address::repeat_byte(0x11),
            value: U256::from(10u64),
            payload: Bytes::new(),
        };
        assert_eq!(tx.hash(), tx.clone().hash());
    }

    #[test]
    fn distinct_nonces_hash_differently() {
        let a = Transaction { nonce: 0, ..Default::default() };
        let b = Transaction { nonce: 1, ..Default::default() };
        assert_ne!(a.hash(), b.hash());
    }
}
