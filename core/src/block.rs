use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::signature::{self, ZERO_HASH};
use crate::transaction::BlockTx;

/// Common information required for each block. Field order is part of the
/// canonical hash encoding and must not change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Hash of the previous block in the chain.
    pub parent_hash: String,
    /// Account of the miner who mined the block.
    pub miner_account: Account,
    /// Number of leading zero hex chars needed to solve the hash puzzle.
    pub difficulty: u32,
    /// Block number in the chain; the first mined block is 1.
    pub number: u64,
    /// Total tip paid by all senders in the block.
    pub total_tip: u64,
    /// Total gas charged to all senders in the block.
    pub total_gas: u64,
    /// Unix seconds when the candidate was built.
    pub timestamp: u64,
    /// Value varied during the PoW search.
    pub nonce: u64,
}

/// A group of transactions batched together. Never mutated once committed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    #[serde(rename = "txs")]
    pub transactions: Vec<BlockTx>,
}

impl Block {
    /// Build the next candidate on top of `prev`. Totals and the PoW nonce
    /// are filled in by the mining flow before the search starts.
    pub fn new(miner_account: Account, difficulty: u32, prev: &Block, transactions: Vec<BlockTx>) -> Block {
        Block {
            header: BlockHeader {
                parent_hash: prev.hash(),
                miner_account,
                difficulty,
                number: prev.header.number + 1,
                total_tip: 0,
                total_gas: 0,
                timestamp: Utc::now().timestamp() as u64,
                nonce: 0,
            },
            transactions,
        }
    }

    /// The unique hash for the block. Number zero is the implicit genesis
    /// block, which hashes to the zero hash.
    pub fn hash(&self) -> String {
        if self.header.number == 0 {
            return ZERO_HASH.to_string();
        }
        signature::hash(self)
    }
}

/// The on-disk line record: the block plus its hash as an integrity anchor
/// for replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockFS {
    pub hash: String,
    pub block: Block,
}

/// A hash solves the puzzle when its first `difficulty` hex chars are '0'.
pub fn is_hash_solved(difficulty: u32, hash: &str) -> bool {
    let difficulty = difficulty as usize;
    if hash.len() != 64 || difficulty > 64 {
        return false;
    }
    hash.as_bytes()[..difficulty].iter().all(|b| *b == b'0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_hashes_to_zero() {
        assert_eq!(Block::default().hash(), ZERO_HASH);
    }

    #[test]
    fn next_block_links_to_parent() {
        let genesis = Block::default();
        let miner = Account::try_from_hex("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();

        let block = Block::new(miner.clone(), 3, &genesis, Vec::new());
        assert_eq!(block.header.number, 1);
        assert_eq!(block.header.parent_hash, ZERO_HASH);

        let next = Block::new(miner, 3, &block, Vec::new());
        assert_eq!(next.header.number, 2);
        assert_eq!(next.header.parent_hash, block.hash());
    }

    #[test]
    fn hash_is_deterministic() {
        let genesis = Block::default();
        let miner = Account::try_from_hex("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        let block = Block::new(miner, 1, &genesis, Vec::new());

        let reparsed: Block = serde_json::from_str(&serde_json::to_string(&block).unwrap()).unwrap();
        assert_eq!(block.hash(), reparsed.hash());
    }

    #[test]
    fn solved_predicate() {
        let solved = format!("000{}", "a".repeat(61));
        assert!(is_hash_solved(0, &solved));
        assert!(is_hash_solved(3, &solved));
        assert!(!is_hash_solved(4, &solved));
        assert!(!is_hash_solved(1, "abc"));
        assert!(is_hash_solved(64, &"0".repeat(64)));
        assert!(!is_hash_solved(65, &"0".repeat(64)));
    }
}
