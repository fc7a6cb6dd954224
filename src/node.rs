use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::blockchain::{Block, Blockchain};
use crate::config::NodeConfig;
use crate::error::{ChainError, NodeError, PersistenceError, ValidationError};
use crate::p2p::{ChainHandler, MessagePayload, P2PConfig, P2PNetwork, PeerInfo};
use crate::storage::{LedgerSnapshot, LedgerStore};
use crate::transaction::{FAUCET_SIGNATURE, PoolStats, Transaction, TransactionPool};

/// Ledger, pool and snapshot store shared between the HTTP layer, the miner
/// thread and the network dispatcher. Locks are always taken chain first.
pub struct LedgerState {
    blockchain: Mutex<Blockchain>,
    pool: Mutex<TransactionPool>,
    store: LedgerStore,
}

impl LedgerState {
    pub fn new(blockchain: Blockchain, pool: TransactionPool, store: LedgerStore) -> Self {
        Self {
            blockchain: Mutex::new(blockchain),
            pool: Mutex::new(pool),
            store,
        }
    }

    /// Run validation and enqueue. Returns the transaction id.
    pub fn submit(&self, tx: Transaction) -> Result<String, ValidationError> {
        let chain = self.blockchain.lock().expect("mutex poisoned");
        let mut pool = self.pool.lock().expect("mutex poisoned");
        pool.admit(tx, &chain)
    }

    /// Admit a transaction that arrived from outside the node, over HTTP or
    /// from a peer. Reserved senders are only ever issued locally.
    pub fn submit_external(&self, tx: Transaction) -> Result<String, ValidationError> {
        if tx.is_reserved_sender() {
            return Err(ValidationError::ReservedSender);
        }
        self.submit(tx)
    }

    /// Append a block built on the current head, evict its transactions from
    /// the pool and persist. A failed save is logged; the append stands.
    pub fn apply_block(&self, block: Block) -> Result<(), ChainError> {
        let ids = block.pooled_transaction_ids();
        let snapshot = {
            let mut chain = self.blockchain.lock().expect("mutex poisoned");
            chain.append(block)?;
            let mut pool = self.pool.lock().expect("mutex poisoned");
            let removed = pool.remove(&ids);
            debug!("LEDGER - block appended, {} pooled transactions confirmed", removed);
            LedgerSnapshot::capture(&chain, &pool)
        };
        self.persist(&snapshot);
        Ok(())
    }

    /// Adopt `candidate` when it is longer and valid, then purge the pool.
    pub fn replace_chain(&self, candidate: Vec<Block>) -> bool {
        let snapshot = {
            let mut chain = self.blockchain.lock().expect("mutex poisoned");
            if !chain.replace_chain(candidate) {
                return false;
            }
            let mut pool = self.pool.lock().expect("mutex poisoned");
            pool.purge_invalid(&chain);
            LedgerSnapshot::capture(&chain, &pool)
        };
        self.persist(&snapshot);
        true
    }

    pub fn save(&self) -> Result<(), PersistenceError> {
        self.store.save(&self.snapshot())
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let chain = self.blockchain.lock().expect("mutex poisoned");
        let pool = self.pool.lock().expect("mutex poisoned");
        LedgerSnapshot::capture(&chain, &pool)
    }

    fn persist(&self, snapshot: &LedgerSnapshot) {
        if let Err(e) = self.store.save(snapshot) {
            error!("LEDGER - failed to save snapshot to {}: {}", self.store.path().display(), e);
        }
    }

    pub fn chain(&self) -> Vec<Block> {
        self.blockchain.lock().expect("mutex poisoned").chain.clone()
    }

    pub fn len(&self) -> usize {
        self.blockchain.lock().expect("mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn balance_of(&self, address: &str) -> f64 {
        self.blockchain.lock().expect("mutex poisoned").balance_of(address)
    }
}

impl ChainHandler for LedgerState {
    fn on_new_block(
        &self,
        network: &Arc<P2PNetwork>,
        from: &str,
        block: Block,
    ) -> Option<MessagePayload> {
        let index = block.index;
        match self.apply_block(block.clone()) {
            Ok(()) => {
                info!("LEDGER - accepted block #{} from {}", index, from);
                network.broadcast_except(MessagePayload::NewBlock(block), Some(from));
                None
            }
            Err(ChainError::BrokenLink { .. } | ChainError::IndexMismatch { .. })
                if index >= self.len() as u64 =>
            {
                info!(
                    "LEDGER - block #{} from {} is ahead of us, requesting chain",
                    index, from
                );
                Some(MessagePayload::RequestChain {})
            }
            Err(e) => {
                debug!("LEDGER - ignoring block #{} from {}: {}", index, from, e);
                None
            }
        }
    }

    fn on_new_transaction(&self, network: &Arc<P2PNetwork>, from: &str, tx: Transaction) {
        let tx = tx.with_id();
        match self.submit_external(tx.clone()) {
            Ok(id) => {
                debug!("POOL - accepted {} from {}", id, from);
                network.broadcast_except(MessagePayload::NewTransaction(tx), Some(from));
            }
            Err(e) => debug!("POOL - rejected transaction from {}: {}", from, e),
        }
    }

    fn chain(&self) -> Vec<Block> {
        LedgerState::chain(self)
    }

    fn on_chain_response(&self, from: &str, chain: Vec<Block>) {
        let (theirs, ours) = (chain.len(), self.len());
        if theirs <= ours {
            debug!("LEDGER - chain from {} ({} blocks) is not longer than ours", from, theirs);
            return;
        }
        if self.replace_chain(chain) {
            info!("LEDGER - replaced chain with {} blocks from {}", theirs, from);
        } else {
            warn!("LEDGER - rejected invalid chain of {} blocks from {}", theirs, from);
        }
    }
}

/// Single-slot background miner.
#[derive(Default)]
pub struct Miner {
    in_progress: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    address: Arc<Mutex<Option<String>>>,
}

impl Miner {
    pub fn is_mining(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    pub fn current_address(&self) -> Option<String> {
        self.address.lock().expect("mutex poisoned").clone()
    }

    /// Ask the running job to stop. Returns false when nothing is being mined.
    pub fn cancel(&self) -> bool {
        if !self.is_mining() {
            return false;
        }
        self.cancel.store(true, Ordering::SeqCst);
        true
    }
}

/// Clears the miner slot when the job ends, however it ends.
struct MinerSlot {
    in_progress: Arc<AtomicBool>,
    address: Arc<Mutex<Option<String>>>,
}

impl Drop for MinerSlot {
    fn drop(&mut self) {
        *self.address.lock().expect("mutex poisoned") = None;
        self.in_progress.store(false, Ordering::SeqCst);
    }
}

/// Handle on a running mining job.
pub struct MiningJob {
    pub miner_address: String,
    result: oneshot::Receiver<Result<Block, NodeError>>,
}

impl MiningJob {
    pub async fn wait(self) -> Result<Block, NodeError> {
        self.result.await.unwrap_or(Err(NodeError::MiningCancelled))
    }

    /// Blocking variant for callers outside an async runtime.
    pub fn wait_blocking(self) -> Result<Block, NodeError> {
        self.result
            .blocking_recv()
            .unwrap_or(Err(NodeError::MiningCancelled))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub chain_length: usize,
    pub difficulty: u32,
    pub mining_reward: f64,
    pub pool_size: usize,
    pub peers: usize,
    pub connected_peers: usize,
    pub is_mining: bool,
    pub mining_address: Option<String>,
    pub network_running: bool,
}

/// A full node: ledger, pool, peer network and miner.
pub struct Node {
    config: NodeConfig,
    ledger: Arc<LedgerState>,
    network: Arc<P2PNetwork>,
    miner: Miner,
}

impl Node {
    /// Load (or create) the ledger from `config.data_dir`. Nothing is started.
    pub fn new(config: NodeConfig) -> Self {
        let store = LedgerStore::new(&config.data_dir);
        let (chain, pool) =
            store.load_or_genesis(config.difficulty, config.mining_reward, config.max_pool_size);
        let network = P2PNetwork::new(P2PConfig::from(&config));
        Self {
            ledger: Arc::new(LedgerState::new(chain, pool, store)),
            network,
            miner: Miner::default(),
            config,
        }
    }

    /// Start the peer network and dial the configured bootstrap peers.
    pub async fn start(&self) -> Result<SocketAddr, NodeError> {
        self.network.set_handler(self.ledger.clone());
        let addr = self.network.start().await?;
        for (host, port) in &self.config.peers {
            if let Err(e) = self.network.add_peer(host, *port) {
                warn!("Skipping bootstrap peer {}:{}: {}", host, port, e);
            }
        }
        info!(
            "Node {} started with {} blocks",
            self.network.node_id(),
            self.ledger.len()
        );
        Ok(addr)
    }

    /// Stop networking and write a final snapshot. A running mining job may
    /// still append its block, but it is no longer broadcast.
    pub fn stop(&self) -> Result<(), NodeError> {
        self.network.stop();
        self.ledger.save()?;
        info!("Node {} stopped", self.network.node_id());
        Ok(())
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn network(&self) -> &Arc<P2PNetwork> {
        &self.network
    }

    pub fn ledger(&self) -> &Arc<LedgerState> {
        &self.ledger
    }

    /// Admit a user transaction and gossip it.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<String, ValidationError> {
        let tx = tx.with_id();
        let id = self.ledger.submit_external(tx.clone())?;
        info!("POOL - transaction {} accepted", id);
        self.network.broadcast(MessagePayload::NewTransaction(tx));
        Ok(id)
    }

    /// Credit `address` through a system transaction, confirmed by the next block.
    pub fn faucet(&self, address: &str, amount: f64) -> Result<String, ValidationError> {
        let id = self
            .ledger
            .submit(Transaction::system(address, amount, FAUCET_SIGNATURE))?;
        info!("FAUCET - queued {} for {} ({})", amount, address, id);
        Ok(id)
    }

    /// Mine the oldest pending transactions on a background thread.
    pub fn start_mining(&self, miner_address: &str) -> Result<MiningJob, NodeError> {
        if self
            .miner
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(NodeError::MiningInProgress);
        }
        self.miner.cancel.store(false, Ordering::SeqCst);
        *self.miner.address.lock().expect("mutex poisoned") = Some(miner_address.to_string());

        let slot = MinerSlot {
            in_progress: self.miner.in_progress.clone(),
            address: self.miner.address.clone(),
        };
        let (tx, rx) = oneshot::channel();
        let ledger = self.ledger.clone();
        let network = self.network.clone();
        let cancel = self.miner.cancel.clone();
        let limit = self.config.max_txs_per_block;
        let address = miner_address.to_string();

        thread::Builder::new()
            .name("miner".into())
            .spawn(move || {
                let result = mine_next(&ledger, &network, &address, limit, &cancel);
                drop(slot);
                let _ = tx.send(result);
            })
            .map_err(NodeError::Spawn)?;

        Ok(MiningJob {
            miner_address: miner_address.to_string(),
            result: rx,
        })
    }

    pub fn cancel_mining(&self) -> bool {
        self.miner.cancel()
    }

    pub fn is_mining(&self) -> bool {
        self.miner.is_mining()
    }

    pub fn balance_of(&self, address: &str) -> f64 {
        self.ledger.balance_of(address)
    }

    pub fn chain(&self) -> Vec<Block> {
        self.ledger.chain()
    }

    pub fn chain_len(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_chain_valid(&self) -> bool {
        self.ledger.blockchain.lock().expect("mutex poisoned").is_valid_chain()
    }

    pub fn difficulty(&self) -> u32 {
        self.ledger.blockchain.lock().expect("mutex poisoned").difficulty()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.ledger.pool.lock().expect("mutex poisoned").stats()
    }

    pub fn pending_transaction(&self, id: &str) -> Option<Transaction> {
        self.ledger.pool.lock().expect("mutex poisoned").get(id).cloned()
    }

    pub fn pending_for_address(&self, address: &str) -> Vec<Transaction> {
        self.ledger.pool.lock().expect("mutex poisoned").by_address(address)
    }

    pub fn add_peer(&self, address: &str, port: u16) -> Result<bool, NodeError> {
        Ok(self.network.add_peer(address, port)?)
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        self.network.peers()
    }

    /// Request chains from every connected peer. Returns how many were asked.
    pub fn sync(&self) -> usize {
        let asked = self.network.request_chains();
        info!("Requested chains from {} peers", asked);
        asked
    }

    pub fn save(&self) -> Result<(), NodeError> {
        Ok(self.ledger.save()?)
    }

    pub fn status(&self) -> NodeStatus {
        let (chain_length, difficulty, mining_reward, pool_size) = {
            let chain = self.ledger.blockchain.lock().expect("mutex poisoned");
            let pool = self.ledger.pool.lock().expect("mutex poisoned");
            (chain.len(), chain.difficulty(), chain.mining_reward(), pool.len())
        };
        let peers = self.network.peers();
        NodeStatus {
            node_id: self.network.node_id(),
            chain_length,
            difficulty,
            mining_reward,
            pool_size,
            connected_peers: peers.iter().filter(|p| p.is_connected).count(),
            peers: peers.len(),
            is_mining: self.miner.is_mining(),
            mining_address: self.miner.current_address(),
            network_running: self.network.is_running(),
        }
    }
}

fn mine_next(
    ledger: &LedgerState,
    network: &P2PNetwork,
    miner_address: &str,
    limit: usize,
    cancel: &AtomicBool,
) -> Result<Block, NodeError> {
    let (mut block, difficulty) = {
        let chain = ledger.blockchain.lock().expect("mutex poisoned");
        let batch = ledger.pool.lock().expect("mutex poisoned").take_for_mining(limit);
        (chain.next_block(batch, miner_address), chain.difficulty())
    };
    info!(
        "MINER - mining block #{} with {} transactions (difficulty {})",
        block.index,
        block.transactions.len(),
        difficulty
    );

    if !block.mine_until(difficulty, cancel) {
        info!("MINER - block #{} cancelled", block.index);
        return Err(NodeError::MiningCancelled);
    }

    ledger.apply_block(block.clone())?;
    info!(
        "MINER - sealed block #{} (hash={}, nonce={})",
        block.index, block.hash, block.nonce
    );
    network.broadcast(MessagePayload::NewBlock(block.clone()));
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{generate_keypair_hex, sign_in_place};

    fn test_node(dir: &std::path::Path) -> Node {
        Node::new(NodeConfig {
            difficulty: 1,
            data_dir: dir.to_path_buf(),
            p2p_port: 0,
            ..NodeConfig::default()
        })
    }

    #[test]
    fn faucet_then_mine_credits_and_clears_pool() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node(dir.path());
        node.faucet("alice", 25.0).unwrap();
        assert_eq!(node.pool_stats().total_transactions, 1);
        assert_eq!(node.balance_of("alice"), 0.0);

        let block = node.start_mining("miner").unwrap().wait_blocking().unwrap();
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(node.balance_of("alice"), 25.0);
        assert_eq!(node.balance_of("miner"), 10.0);
        assert_eq!(node.pool_stats().total_transactions, 0);
        assert!(!node.is_mining());
        assert!(node.is_chain_valid());
    }

    #[test]
    fn signed_transfer_flows_through_the_node() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node(dir.path());
        let (sk, _pk, alice) = generate_keypair_hex();
        node.faucet(&alice, 20.0).unwrap();
        node.start_mining("miner").unwrap().wait_blocking().unwrap();

        let mut tx = Transaction::new(alice.clone(), "bob", 7.5);
        sign_in_place(&sk, &mut tx).unwrap();
        let id = node.submit_transaction(tx.clone()).unwrap();
        assert!(node.pending_transaction(&id).is_some());
        assert_eq!(node.pending_for_address("bob").len(), 1);
        assert_eq!(
            node.submit_transaction(tx),
            Err(ValidationError::DoubleSpend)
        );

        node.start_mining("miner").unwrap().wait_blocking().unwrap();
        assert_eq!(node.balance_of(&alice), 12.5);
        assert_eq!(node.balance_of("bob"), 7.5);
    }

    #[test]
    fn second_mining_request_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = NodeConfig {
            data_dir: dir.path().to_path_buf(),
            ..NodeConfig::default()
        };
        cfg.difficulty = 1;
        let node = Node::new(cfg);
        // Raise difficulty beyond reach so the first job keeps running.
        node.ledger.blockchain.lock().unwrap().difficulty = 64;

        let job = node.start_mining("m1").unwrap();
        assert!(node.is_mining());
        assert_eq!(node.status().mining_address.as_deref(), Some("m1"));
        assert!(matches!(
            node.start_mining("m2"),
            Err(NodeError::MiningInProgress)
        ));

        assert!(node.cancel_mining());
        assert!(matches!(job.wait_blocking(), Err(NodeError::MiningCancelled)));
        assert!(!node.is_mining());
        assert_eq!(node.chain_len(), 1);
    }

    #[test]
    fn peer_cannot_submit_reserved_sender_credit() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node(dir.path());
        let network = node.network().clone();

        let credit = Transaction::system("mallory", 1e6, FAUCET_SIGNATURE);
        node.ledger.on_new_transaction(&network, "peer", credit.clone());
        assert_eq!(node.pool_stats().total_transactions, 0);
        assert_eq!(
            node.submit_transaction(credit),
            Err(ValidationError::ReservedSender)
        );

        node.start_mining("miner").unwrap().wait_blocking().unwrap();
        assert_eq!(node.balance_of("mallory"), 0.0);
    }

    #[test]
    fn mining_evicts_only_the_mined_entry() {
        let dir = tempfile::tempdir().unwrap();
        let node = Node::new(NodeConfig {
            difficulty: 1,
            data_dir: dir.path().to_path_buf(),
            p2p_port: 0,
            max_txs_per_block: 1,
            ..NodeConfig::default()
        });
        for to in ["alice", "bob"] {
            let mut tx = Transaction::system(to, 5.0, FAUCET_SIGNATURE);
            tx.transaction_id = Some("X".into());
            node.ledger.submit(tx).unwrap();
        }

        let block = node.start_mining("miner").unwrap().wait_blocking().unwrap();
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(node.pool_stats().total_transactions, 1);
        assert_eq!(node.pending_for_address("bob").len(), 1);
        assert_eq!(node.balance_of("alice"), 5.0);
    }

    #[test]
    fn ledger_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let node = test_node(dir.path());
            node.faucet("alice", 5.0).unwrap();
            node.start_mining("miner").unwrap().wait_blocking().unwrap();
            node.faucet("carol", 1.0).unwrap();
            node.save().unwrap();
        }
        let node = test_node(dir.path());
        assert_eq!(node.chain_len(), 2);
        assert_eq!(node.balance_of("alice"), 5.0);
        assert_eq!(node.pool_stats().total_transactions, 1);
    }

    #[test]
    fn longer_peer_chain_replaces_ours() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node(dir.path());

        let mut theirs = Blockchain::new(1, 10.0);
        for _ in 0..3 {
            let block = theirs.mine(Vec::new(), "peer-miner");
            theirs.append(block).unwrap();
        }
        node.ledger.on_chain_response("peer", theirs.chain.clone());
        assert_eq!(node.chain(), theirs.chain);

        // Shorter or equal chains are ignored.
        let short = Blockchain::new(1, 10.0);
        node.ledger.on_chain_response("peer", short.chain);
        assert_eq!(node.chain_len(), 4);
    }

    #[test]
    fn block_ahead_of_head_requests_chain() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node(dir.path());
        let network = node.network().clone();

        let mut theirs = Blockchain::new(1, 10.0);
        for _ in 0..2 {
            let block = theirs.mine(Vec::new(), "peer-miner");
            theirs.append(block).unwrap();
        }
        let ahead = theirs.last_block().clone();
        assert_eq!(
            node.ledger.on_new_block(&network, "peer", ahead),
            Some(MessagePayload::RequestChain {})
        );

        let stale = theirs.chain[0].clone();
        assert_eq!(node.ledger.on_new_block(&network, "peer", stale), None);

        let next = {
            let chain = node.ledger.blockchain.lock().unwrap();
            chain.mine(Vec::new(), "peer-miner")
        };
        assert_eq!(node.ledger.on_new_block(&network, "peer", next), None);
        assert_eq!(node.chain_len(), 2);
    }
}
