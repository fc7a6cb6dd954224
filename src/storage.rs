use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::blockchain::{Block, Blockchain};
use crate::error::PersistenceError;
use crate::transaction::{Transaction, TransactionPool};

pub const SNAPSHOT_FILE: &str = "blockchain.json";

/// Durable image of the ledger: blocks, parameters and pending pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub chain: Vec<Block>,
    pub difficulty: u32,
    pub mining_reward: f64,
    #[serde(default)]
    pub mempool: Vec<Transaction>,
}

impl LedgerSnapshot {
    pub fn capture(chain: &Blockchain, pool: &TransactionPool) -> Self {
        Self {
            chain: chain.chain.clone(),
            difficulty: chain.difficulty(),
            mining_reward: chain.mining_reward(),
            mempool: pool.pending().to_vec(),
        }
    }
}

/// JSON file holding a [`LedgerSnapshot`].
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(SNAPSHOT_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no snapshot exists yet.
    pub fn load(&self) -> Result<Option<LedgerSnapshot>, PersistenceError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let snapshot: LedgerSnapshot = serde_json::from_str(&raw)?;
        Ok(Some(snapshot))
    }

    pub fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), PersistenceError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        // Written aside, then renamed over the previous snapshot.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(snapshot)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Load the persisted ledger, or mine a fresh genesis when the snapshot is
    /// missing, unreadable or empty. A fresh ledger is saved immediately.
    pub fn load_or_genesis(
        &self,
        difficulty: u32,
        mining_reward: f64,
        pool_capacity: usize,
    ) -> (Blockchain, TransactionPool) {
        match self.load() {
            Ok(Some(snapshot)) => {
                let LedgerSnapshot {
                    chain,
                    difficulty,
                    mining_reward,
                    mempool,
                } = snapshot;
                if let Some(chain) = Blockchain::from_blocks(chain, difficulty, mining_reward) {
                    info!(
                        "Loaded blockchain with {} blocks from {}",
                        chain.len(),
                        self.path.display()
                    );
                    let mut pool = TransactionPool::with_pending(pool_capacity, mempool);
                    pool.purge_invalid(&chain);
                    return (chain, pool);
                }
                warn!("Snapshot {} has no blocks, starting fresh", self.path.display());
            }
            Ok(None) => info!("No snapshot at {}, creating genesis", self.path.display()),
            Err(e) => warn!(
                "Error loading blockchain from {}: {}; creating genesis",
                self.path.display(),
                e
            ),
        }

        let chain = Blockchain::new(difficulty, mining_reward);
        let pool = TransactionPool::new(pool_capacity);
        if let Err(e) = self.save(&LedgerSnapshot::capture(&chain, &pool)) {
            warn!("Failed to save fresh ledger: {}", e);
        }
        (chain, pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_creates_and_saves_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path());
        let (chain, pool) = store.load_or_genesis(1, 10.0, 100);
        assert_eq!(chain.len(), 1);
        assert!(pool.is_empty());
        assert!(store.path().exists());
    }

    #[test]
    fn save_then_load_reproduces_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path());
        let mut chain = Blockchain::new(2, 10.0);
        let block = chain.mine(
            vec![Transaction::system("alice", 12.345678, "SYSTEM")],
            "miner",
        );
        chain.append(block).unwrap();
        let mut pool = TransactionPool::new(10);
        pool.admit(Transaction::system("bob", 0.1, "SYSTEM"), &chain)
            .unwrap();

        let snapshot = LedgerSnapshot::capture(&chain, &pool);
        store.save(&snapshot).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, snapshot);

        let reloaded = Blockchain::from_blocks(loaded.chain, 2, 10.0).unwrap();
        assert!(reloaded.is_valid_chain());
        for (a, b) in reloaded.chain.iter().zip(chain.chain.iter()) {
            assert_eq!(a.compute_hash(), b.hash);
        }

        // Saving what was loaded yields the same file.
        let first = std::fs::read(store.path()).unwrap();
        store.save(&store.load().unwrap().unwrap()).unwrap();
        assert_eq!(std::fs::read(store.path()).unwrap(), first);
    }

    #[test]
    fn corrupt_snapshot_falls_back_to_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path());
        std::fs::write(store.path(), b"{ not json").unwrap();
        assert!(matches!(store.load(), Err(PersistenceError::Parse(_))));

        let (chain, _) = store.load_or_genesis(1, 10.0, 100);
        assert_eq!(chain.len(), 1);
        assert!(store.load().unwrap().is_some());
    }

    #[test]
    fn missing_fields_count_as_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path());
        std::fs::write(store.path(), br#"{"difficulty": 2}"#).unwrap();
        let (chain, _) = store.load_or_genesis(1, 10.0, 100);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.difficulty(), 1);
    }

    #[test]
    fn loaded_pool_is_restored() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path());
        let chain = Blockchain::new(1, 10.0);
        let mut pool = TransactionPool::new(10);
        pool.admit(Transaction::system("bob", 3.0, "SYSTEM"), &chain)
            .unwrap();
        store.save(&LedgerSnapshot::capture(&chain, &pool)).unwrap();

        let (_, restored) = store.load_or_genesis(1, 10.0, 10);
        assert_eq!(restored.len(), 1);
    }
}
