use std::collections::HashSet;

use log::{debug, info};
use serde::Serialize;

use super::model::Transaction;
use super::validator::TransactionValidator;
use crate::blockchain::Blockchain;
use crate::error::ValidationError;

/// Default pool capacity.
pub const DEFAULT_MAX_POOL_SIZE: usize = 1000;

/// Bounded FIFO of validated, not-yet-mined transactions.
#[derive(Debug, Clone)]
pub struct TransactionPool {
    pending: Vec<Transaction>,
    capacity: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub total_transactions: usize,
    pub max_pool_size: usize,
    pub pool_usage: String,
    pub transactions: Vec<Transaction>,
}

impl Default for TransactionPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POOL_SIZE)
    }
}

impl TransactionPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Vec::new(),
            capacity,
        }
    }

    /// Restore persisted entries as-is. Call [`TransactionPool::purge_invalid`]
    /// afterwards to re-check them against the loaded chain.
    pub fn with_pending(capacity: usize, pending: Vec<Transaction>) -> Self {
        Self { pending, capacity }
    }

    /// Validate and enqueue `tx`. Returns the derived id on success. A full
    /// pool rejects, it never evicts to make room.
    pub fn admit(&mut self, tx: Transaction, chain: &Blockchain) -> Result<String, ValidationError> {
        let admission = TransactionValidator::new(chain, &self.pending).validate(&tx)?;

        if self.pending.len() >= self.capacity {
            return Err(ValidationError::PoolFull {
                capacity: self.capacity,
            });
        }

        let tx = tx.with_id();
        let id = tx.compute_id();
        self.pending.push(tx);
        debug!(
            "POOL - admitted {} ({}), size now {}",
            id,
            admission.reason(),
            self.pending.len()
        );
        Ok(id)
    }

    /// Oldest `limit` entries, in admission order. Does not remove anything.
    pub fn take_for_mining(&self, limit: usize) -> Vec<Transaction> {
        self.pending.iter().take(limit).cloned().collect()
    }

    /// Evict every entry whose derived id is in `ids`. Returns how many were removed.
    pub fn remove(&mut self, ids: &[String]) -> usize {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let before = self.pending.len();
        self.pending.retain(|tx| !ids.contains(tx.compute_id().as_str()));
        before - self.pending.len()
    }

    /// Re-run validation over every entry and drop the failures. An entry is
    /// checked against the chain and the entries kept before it.
    pub fn purge_invalid(&mut self, chain: &Blockchain) -> usize {
        let before = self.pending.len();
        let mut kept: Vec<Transaction> = Vec::with_capacity(before);
        for tx in std::mem::take(&mut self.pending) {
            match TransactionValidator::new(chain, &kept).validate(&tx) {
                Ok(_) => kept.push(tx),
                Err(e) => debug!("POOL - dropping {}: {}", tx.compute_id(), e),
            }
        }
        let removed = before - kept.len();
        self.pending = kept;
        if removed > 0 {
            info!("POOL - purged {} invalid transactions", removed);
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<&Transaction> {
        self.pending.iter().find(|tx| tx.compute_id() == id)
    }

    /// Pending entries sent from or to `address`.
    pub fn by_address(&self, address: &str) -> Vec<Transaction> {
        self.pending
            .iter()
            .filter(|tx| tx.sender == address || tx.recipient == address)
            .cloned()
            .collect()
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_transactions: self.pending.len(),
            max_pool_size: self.capacity,
            pool_usage: format!("{}/{}", self.pending.len(), self.capacity),
            transactions: self.pending.clone(),
        }
    }
}
