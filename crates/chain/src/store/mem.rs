//! In-memory [`ChainStore`] implementation.

use crate::{ChainStore, StoreError};
use alloy_primitives::B256;
use lode_protocol::Block;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
struct Row {
    block: Block,
    main: bool,
}

#[derive(Debug, Default)]
struct StoreInner {
    rows: HashMap<B256, Row>,
    /// Height to hash, main chain only. The peak is the highest entry.
    numbers: BTreeMap<u64, B256>,
}

impl StoreInner {
    /// Points `number → hash`, flipping any displaced row to alt.
    fn map_number(&mut self, number: u64, hash: B256) {
        if let Some(displaced) = self.numbers.insert(number, hash) {
            if displaced != hash {
                if let Some(row) = self.rows.get_mut(&displaced) {
                    row.main = false;
                }
            }
        }
        if let Some(row) = self.rows.get_mut(&hash) {
            row.main = true;
        }
    }
}

/// A [`ChainStore`] backed by process memory.
///
/// Complete with respect to the contract, including the main-branch rewrite
/// performed by [`ChainStore::put_peak`]. Suitable for tests and development
/// nodes; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryChainStore {
    inner: RwLock<StoreInner>,
}

impl MemoryChainStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainStore for MemoryChainStore {
    fn peak_block(&self) -> Result<Option<Block>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .numbers
            .values()
            .next_back()
            .and_then(|hash| inner.rows.get(hash))
            .map(|row| row.block.clone()))
    }

    fn put_peak(&self, block: &Block) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.rows.insert(block.hash(), Row { block: block.clone(), main: true });

        // Heights above the new peak no longer belong to any main branch.
        let stale: Vec<u64> =
            inner.numbers.range(block.number() + 1..).map(|(&n, _)| n).collect();
        for number in stale {
            if let Some(hash) = inner.numbers.remove(&number) {
                if let Some(row) = inner.rows.get_mut(&hash) {
                    row.main = false;
                }
            }
        }

        // Walk the new branch down until it rejoins the recorded main chain.
        let mut cursor = block.clone();
        loop {
            let number = cursor.number();
            if inner.numbers.get(&number) == Some(&cursor.hash()) {
                break;
            }
            inner.map_number(number, cursor.hash());
            if number == 0 {
                break;
            }
            match inner.rows.get(&cursor.parent_hash()) {
                Some(parent) => cursor = parent.block.clone(),
                None => break,
            }
        }

        Ok(())
    }

    fn put_block(&self, block: &Block) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.rows.insert(block.hash(), Row { block: block.clone(), main: true });
        inner.map_number(block.number(), block.hash());
        Ok(())
    }

    fn put_new_block(&self, block: &Block) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner
            .rows
            .entry(block.hash())
            .or_insert_with(|| Row { block: block.clone(), main: false });
        Ok(())
    }

    fn block(&self, number: u64) -> Result<Option<Block>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .numbers
            .get(&number)
            .and_then(|hash| inner.rows.get(hash))
            .map(|row| row.block.clone()))
    }

    fn block_by_hash(&self, hash: &B256) -> Result<Option<Block>, StoreError> {
        Ok(self.inner.read().rows.get(hash).map(|row| row.block.clone()))
    }

    fn block_by_txhash(&self, tx_hash: &B256) -> Result<Option<Block>, StoreError> {
        let inner = self.inner.read();
        for hash in inner.numbers.values() {
            if let Some(row) = inner.rows.get(hash) {
                if row.block.transactions().iter().any(|tx| tx.hash() == *tx_hash) {
                    return Ok(Some(row.block.clone()));
                }
            }
        }
        Ok(None)
    }

    fn blocks_by_hash(&self, hash: &B256, limit: usize) -> Result<Vec<Block>, StoreError> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        let mut cursor = *hash;
        while out.len() < limit {
            let Some(row) = inner.rows.get(&cursor) else { break };
            out.push(row.block.clone());
            if row.block.number() == 0 {
                break;
            }
            cursor = row.block.parent_hash();
        }
        Ok(out)
    }

    fn top_blocks(&self, count: usize) -> Result<Vec<Block>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .numbers
            .values()
            .rev()
            .take(count)
            .filter_map(|hash| inner.rows.get(hash))
            .map(|row| row.block.clone())
            .collect())
    }

    fn all_block_hashes(&self) -> Result<Vec<(B256, u64)>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.rows.iter().map(|(hash, row)| (*hash, row.block.number())).collect())
    }

    fn clear_alt_blocks(&self) -> Result<(), StoreError> {
        self.inner.write().rows.retain(|_, row| row.main);
        Ok(())
    }

    fn truncate_blocks(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.rows.clear();
        inner.numbers.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use lode_protocol::BlockHeader;

    fn child_of(parent: Option<&Block>, number: u64, salt: u64) -> Block {
        let header = BlockHeader {
            parent_hash: parent.map(Block::hash).unwrap_or_default(),
            number,
            nonce: salt,
            total_difficulty: U256::from(number + salt),
            ..Default::default()
        };
        Block::new(header, vec![], vec![])
    }

    #[test]
    fn put_block_maps_the_height() {
        let store = MemoryChainStore::new();
        let genesis = child_of(None, 0, 0);
        store.put_block(&genesis).unwrap();

        assert_eq!(store.block(0).unwrap().unwrap().hash(), genesis.hash());
        assert_eq!(store.block_by_hash(&genesis.hash()).unwrap().unwrap().hash(), genesis.hash());
    }

    #[test]
    fn peak_is_the_highest_main_row() {
        let store = MemoryChainStore::new();
        assert!(store.peak_block().unwrap().is_none());

        let genesis = child_of(None, 0, 0);
        let b1 = child_of(Some(&genesis), 1, 1);
        store.put_peak(&genesis).unwrap();
        assert_eq!(store.peak_block().unwrap().unwrap().hash(), genesis.hash());

        // A plain main-chain insert advances the derived peak.
        store.put_block(&b1).unwrap();
        assert_eq!(store.peak_block().unwrap().unwrap().hash(), b1.hash());
    }

    #[test]
    fn alt_rows_are_invisible_by_height() {
        let store = MemoryChainStore::new();
        let genesis = child_of(None, 0, 0);
        let alt = child_of(Some(&genesis), 1, 7);
        store.put_block(&genesis).unwrap();
        store.put_new_block(&alt).unwrap();

        assert!(store.block(1).unwrap().is_none());
        assert!(store.block_by_hash(&alt.hash()).unwrap().is_some());
    }

    #[test]
    fn put_peak_rewrites_the_branch() {
        let store = MemoryChainStore::new();
        let genesis = child_of(None, 0, 0);
        let main1 = child_of(Some(&genesis), 1, 1);
        let alt1 = child_of(Some(&genesis), 1, 2);
        let alt2 = child_of(Some(&alt1), 2, 3);

        store.put_block(&genesis).unwrap();
        store.put_peak(&main1).unwrap();
        store.put_new_block(&alt1).unwrap();
        store.put_peak(&alt2).unwrap();

        assert_eq!(store.peak_block().unwrap().unwrap().hash(), alt2.hash());
        assert_eq!(store.block(1).unwrap().unwrap().hash(), alt1.hash());
        assert_eq!(store.block(2).unwrap().unwrap().hash(), alt2.hash());
        // The displaced block stays reachable by hash.
        assert_eq!(store.block_by_hash(&main1.hash()).unwrap().unwrap().hash(), main1.hash());
    }

    #[test]
    fn put_peak_truncates_stale_heights() {
        let store = MemoryChainStore::new();
        let genesis = child_of(None, 0, 0);
        let b1 = child_of(Some(&genesis), 1, 1);
        let b2 = child_of(Some(&b1), 2, 1);
        let heavy1 = child_of(Some(&genesis), 1, 9);

        store.put_block(&genesis).unwrap();
        store.put_peak(&b1).unwrap();
        store.put_peak(&b2).unwrap();
        store.put_peak(&heavy1).unwrap();

        assert_eq!(store.peak_block().unwrap().unwrap().hash(), heavy1.hash());
        assert!(store.block(2).unwrap().is_none());
    }

    #[test]
    fn blocks_by_hash_walks_parents_descending() {
        let store = MemoryChainStore::new();
        let genesis = child_of(None, 0, 0);
        let b1 = child_of(Some(&genesis), 1, 1);
        let b2 = child_of(Some(&b1), 2, 1);
        for block in [&genesis, &b1, &b2] {
            store.put_block(block).unwrap();
        }

        let walk = store.blocks_by_hash(&b2.hash(), 10).unwrap();
        let numbers: Vec<u64> = walk.iter().map(Block::number).collect();
        assert_eq!(numbers, vec![2, 1, 0]);

        let capped = store.blocks_by_hash(&b2.hash(), 2).unwrap();
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn clear_alt_blocks_keeps_the_main_chain() {
        let store = MemoryChainStore::new();
        let genesis = child_of(None, 0, 0);
        let alt = child_of(Some(&genesis), 1, 5);
        store.put_block(&genesis).unwrap();
        store.put_new_block(&alt).unwrap();

        store.clear_alt_blocks().unwrap();

        assert!(store.block_by_hash(&alt.hash()).unwrap().is_none());
        assert!(store.block_by_hash(&genesis.hash()).unwrap().is_some());
    }

    #[test]
    fn find_by_transaction_hash() {
        use lode_protocol::Transaction;

        let tx = Transaction { nonce: 42, ..Default::default() };
        let header = BlockHeader { number: 1, ..Default::default() };
        let block = Block::new(header, vec![tx.clone()], vec![]);

        let store = MemoryChainStore::new();
        store.put_block(&block).unwrap();

        assert_eq!(store.block_by_txhash(&tx.hash()).unwrap().unwrap().hash(), block.hash());
        assert!(store.block_by_txhash(&B256::repeat_byte(0xff)).unwrap().is_none());
    }
}
