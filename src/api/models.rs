use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::blockchain::Block;
use crate::node::Node;
use crate::transaction::Transaction;

/// Shared application state: the running node.
pub struct AppState {
    pub node: Arc<Node>,
}

impl AppState {
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }
}

/* ---------- Chain API Models ---------- */

#[derive(Serialize)]
pub struct ChainResponse {
    pub length: usize,
    pub difficulty: u32,
    pub chain: Vec<Block>,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub length: usize,
    pub difficulty: u32,
}

/* ---------- Mining API Models ---------- */

#[derive(Deserialize)]
pub struct MineRequest {
    pub miner_address: String,
}

#[derive(Serialize)]
pub struct MineResponse {
    pub message: String,
    pub miner_address: String,
}

/* ---------- TX API Models ---------- */

#[derive(Serialize)]
pub struct NewTxResponse {
    pub transaction_id: String,
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct AddressTransactionsResponse {
    pub address: String,
    pub transactions: Vec<Transaction>,
}

/* ---------- Faucet API Models (dev) ---------- */

#[derive(Deserialize)]
pub struct FaucetRequest {
    pub address: String,
    pub amount: f64,
}

#[derive(Serialize)]
pub struct FaucetResponse {
    pub transaction_id: String,
    pub address: String,
    pub amount: f64,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: f64,
}

/* ---------- Peer API Models ---------- */

#[derive(Deserialize)]
pub struct AddPeerRequest {
    pub address: String,
    pub port: u16,
}

#[derive(Serialize)]
pub struct AddPeerResponse {
    pub peer_id: String,
    pub added: bool,
}

#[derive(Serialize)]
pub struct SyncResponse {
    pub requested_from: usize,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}
