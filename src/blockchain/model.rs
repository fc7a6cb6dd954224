use log::{debug, info, warn};

use super::{Block, GENESIS_PREVIOUS_HASH, meets_difficulty};
use crate::error::ChainError;
use crate::transaction::Transaction;

/// In-memory blockchain with Proof-of-Work. Owns every confirmed block.
#[derive(Debug, Clone)]
pub struct Blockchain {
    pub chain: Vec<Block>,
    pub difficulty: u32,
    pub mining_reward: f64,
}

impl Blockchain {
    /// Initialize a new blockchain with a mined genesis block.
    pub fn new(difficulty: u32, mining_reward: f64) -> Self {
        let mut genesis = Block::genesis();
        genesis.mine(difficulty);
        info!("Genesis block mined: {}", genesis.hash);
        Self {
            chain: vec![genesis],
            difficulty,
            mining_reward,
        }
    }

    /// Rebuild a blockchain from persisted blocks. Returns `None` for an empty list.
    pub fn from_blocks(chain: Vec<Block>, difficulty: u32, mining_reward: f64) -> Option<Self> {
        if chain.is_empty() {
            return None;
        }
        Some(Self {
            chain,
            difficulty,
            mining_reward,
        })
    }

    /// Return the last block in the chain.
    pub fn last_block(&self) -> &Block {
        self.chain
            .last()
            .expect("Blockchain should always have at least the genesis block")
    }

    /// Build the unmined candidate that would extend the current head:
    /// `transactions` followed by the miner's reward.
    pub fn next_block(&self, mut transactions: Vec<Transaction>, miner_address: &str) -> Block {
        transactions.push(Transaction::reward(miner_address, self.mining_reward));
        let head = self.last_block();
        Block::new(head.index + 1, head.hash.clone(), transactions)
    }

    /// Build and mine a block on top of the current head without touching the
    /// chain. Call [`Blockchain::append`] with the result to commit it.
    pub fn mine(&self, transactions: Vec<Transaction>, miner_address: &str) -> Block {
        let mut block = self.next_block(transactions, miner_address);
        block.mine(self.difficulty);
        block
    }

    /// Append a mined block after checking linkage, hash integrity and work.
    pub fn append(&mut self, block: Block) -> Result<(), ChainError> {
        let head = self.last_block();
        if block.previous_hash != head.hash {
            return Err(ChainError::BrokenLink {
                expected: head.hash.clone(),
                found: block.previous_hash,
            });
        }
        if block.index != head.index + 1 {
            return Err(ChainError::IndexMismatch {
                expected: head.index + 1,
                found: block.index,
            });
        }
        check_block(&block, self.difficulty)?;

        debug!("LEDGER - appended block #{} ({})", block.index, block.hash);
        self.chain.push(block);
        Ok(())
    }

    /// Validate the entire chain: genesis shape, linkage, hashes and PoW.
    pub fn is_valid_chain(&self) -> bool {
        is_valid_chain(&self.chain, self.difficulty)
    }

    /// Longest-valid-chain rule. The candidate replaces the local chain only if it
    /// is strictly longer and valid on its own; otherwise nothing changes.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> bool {
        if candidate.len() <= self.chain.len() {
            debug!(
                "LEDGER - candidate chain not longer ({} <= {}), keeping local",
                candidate.len(),
                self.chain.len()
            );
            return false;
        }
        if !is_valid_chain(&candidate, self.difficulty) {
            warn!(
                "LEDGER - rejected invalid candidate chain of length {}",
                candidate.len()
            );
            return false;
        }

        info!(
            "LEDGER - replacing chain: {} -> {} blocks",
            self.chain.len(),
            candidate.len()
        );
        self.chain = candidate;
        true
    }

    /// Derived balance: credits minus debits over every confirmed transaction.
    pub fn balance_of(&self, address: &str) -> f64 {
        let mut balance = 0.0;
        for tx in self.chain.iter().flat_map(|b| b.transactions.iter()) {
            if tx.recipient == address {
                balance += tx.amount;
            }
            if tx.sender == address {
                balance -= tx.amount;
            }
        }
        balance
    }

    /// Whether a confirmed transaction has the given derived id.
    pub fn contains_transaction(&self, id: &str) -> bool {
        self.chain
            .iter()
            .flat_map(|b| b.transactions.iter())
            .any(|tx| tx.compute_id() == id)
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn mining_reward(&self) -> f64 {
        self.mining_reward
    }
}

fn check_block(block: &Block, difficulty: u32) -> Result<(), ChainError> {
    let computed = block.compute_hash();
    if block.hash != computed {
        return Err(ChainError::HashMismatch {
            stored: block.hash.clone(),
            computed,
        });
    }
    if !meets_difficulty(&block.hash, difficulty) {
        return Err(ChainError::InsufficientWork {
            hash: block.hash.clone(),
            difficulty,
        });
    }
    Ok(())
}

/// Pure validity check over a block list, independent of any live ledger.
pub fn is_valid_chain(chain: &[Block], difficulty: u32) -> bool {
    let Some(genesis) = chain.first() else {
        return false;
    };

    // Genesis: fixed root and intact hash. Its work is not re-checked.
    if genesis.index != 0
        || genesis.previous_hash != GENESIS_PREVIOUS_HASH
        || genesis.hash != genesis.compute_hash()
    {
        return false;
    }

    for (i, pair) in chain.windows(2).enumerate() {
        let (prev, current) = (&pair[0], &pair[1]);

        if current.index != (i + 1) as u64 {
            return false;
        }
        if current.previous_hash != prev.hash {
            return false;
        }
        if check_block(current, difficulty).is_err() {
            return false;
        }
    }

    true
}
