use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{GENESIS_PREVIOUS_HASH, unix_now};
use crate::transaction::{GENESIS_SENDER, Transaction};

/// How often (in nonces) the proof search checks for cancellation and logs progress.
const MINING_CHECK_INTERVAL: u64 = 100_000;

/// A single block in the blockchain holding a list of transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: f64, // Unix timestamp (UTC), seconds
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub nonce: u64,   // Proof-of-Work nonce
    pub hash: String, // Hash over every other field
}

impl Block {
    /// Create the (unmined) genesis block holding the synthetic genesis transaction.
    pub fn genesis() -> Self {
        Self::new(
            0,
            GENESIS_PREVIOUS_HASH.to_string(),
            vec![Transaction::genesis()],
        )
    }

    /// Create a new block (not mined yet). Call `mine()` to perform PoW.
    pub fn new(index: u64, previous_hash: String, transactions: Vec<Transaction>) -> Self {
        Self::new_with_timestamp(index, previous_hash, transactions, unix_now())
    }

    pub fn new_with_timestamp(
        index: u64,
        previous_hash: String,
        transactions: Vec<Transaction>,
        timestamp: f64,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// SHA-256 over the canonical JSON encoding of
    /// (index, nonce, previous_hash, timestamp, transactions), keys sorted.
    pub fn compute_hash(&self) -> String {
        let preimage = serde_json::json!({
            "index": self.index,
            "nonce": self.nonce,
            "previous_hash": self.previous_hash,
            "timestamp": self.timestamp,
            "transactions": self.transactions,
        });
        let mut hasher = Sha256::new();
        hasher.update(preimage.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Perform Proof-of-Work by finding a nonce that yields a hash
    /// starting with `difficulty` leading zeros (in hex).
    pub fn mine(&mut self, difficulty: u32) {
        let never = AtomicBool::new(false);
        self.mine_until(difficulty, &never);
    }

    /// Same search as [`Block::mine`], but gives up when `cancel` is raised.
    /// Returns whether a valid proof was found.
    pub fn mine_until(&mut self, difficulty: u32, cancel: &AtomicBool) -> bool {
        self.hash = self.compute_hash();
        while !meets_difficulty(&self.hash, difficulty) {
            self.nonce = self.nonce.wrapping_add(1);
            self.hash = self.compute_hash();

            if self.nonce % MINING_CHECK_INTERVAL == 0 {
                debug!(
                    "MINER - block #{} nonce={} hash={}...",
                    self.index,
                    self.nonce,
                    &self.hash[..16]
                );
                if cancel.load(Ordering::Relaxed) {
                    return false;
                }
            }
        }
        true
    }

    /// Validate that the block's stored `hash` matches its content and
    /// satisfies the PoW difficulty. (Does NOT validate chain linkage.)
    pub fn is_valid(&self, difficulty: u32) -> bool {
        self.hash == self.compute_hash() && meets_difficulty(&self.hash, difficulty)
    }

    /// Ids of the transactions that came from the pool, i.e. everything but the
    /// coinbase reward and the genesis entry.
    pub fn pooled_transaction_ids(&self) -> Vec<String> {
        self.transactions
            .iter()
            .filter(|tx| !tx.is_coinbase() && tx.sender != GENESIS_SENDER)
            .map(Transaction::compute_id)
            .collect()
    }
}

/// True when the first `difficulty` hex characters of `hash` are all `0`.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.chars().take(difficulty).all(|c| c == '0')
}
