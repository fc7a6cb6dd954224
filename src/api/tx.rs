use actix_web::{HttpResponse, Responder, get, post, web};
use log::{debug, info, warn};
use std::time::Instant;

use super::models::{
    AddressTransactionsResponse, AppState, ErrorResponse, FaucetRequest, FaucetResponse,
    NewTxResponse,
};
use crate::transaction::Transaction;

/// DEV Faucet: queue a system credit for `address`; it is confirmed by the
/// next mined block.
#[post("/faucet/")]
pub async fn post_faucet(
    state: web::Data<AppState>,
    body: web::Json<FaucetRequest>,
) -> impl Responder {
    let FaucetRequest { address, amount } = body.into_inner();
    match state.node.faucet(&address, amount) {
        Ok(transaction_id) => {
            debug!("FAUCET - {} queued for {} ({})", amount, address, transaction_id);
            HttpResponse::Ok().json(FaucetResponse {
                transaction_id,
                address,
                amount,
            })
        }
        Err(e) => HttpResponse::BadRequest().json(ErrorResponse::new(e)),
    }
}

/// Submit a signed transaction into the pool.
#[post("/transactions/")]
pub async fn post_transaction(
    state: web::Data<AppState>,
    body: web::Json<Transaction>,
) -> impl Responder {
    let t0 = Instant::now();
    let tx = body.into_inner();
    debug!(
        "POST /transactions/ - received: {} -> {} ({})",
        tx.sender, tx.recipient, tx.amount
    );

    match state.node.submit_transaction(tx) {
        Ok(transaction_id) => {
            info!(
                "POST /transactions/ - {} OK ({} ms)",
                transaction_id,
                t0.elapsed().as_millis()
            );
            HttpResponse::Created().json(NewTxResponse {
                transaction_id,
                message: "Transaction added to pool",
            })
        }
        Err(e) => {
            warn!("POST /transactions/ - rejected: {}", e);
            HttpResponse::BadRequest().json(ErrorResponse::new(e))
        }
    }
}

/// Pool statistics with every pending transaction.
#[get("/transactions/")]
pub async fn get_pool(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.node.pool_stats())
}

#[get("/transactions/{id}/")]
pub async fn get_transaction(
    state: web::Data<AppState>,
    path: web::Path<(String,)>,
) -> impl Responder {
    let id = path.into_inner().0;
    match state.node.pending_transaction(&id) {
        Some(tx) => HttpResponse::Ok().json(tx),
        None => HttpResponse::NotFound().json(ErrorResponse::new("Transaction not found")),
    }
}

/// Pending transactions sent from or to `address`.
#[get("/transactions/address/{address}/")]
pub async fn get_transactions_by_address(
    state: web::Data<AppState>,
    path: web::Path<(String,)>,
) -> impl Responder {
    let address = path.into_inner().0;
    let transactions = state.node.pending_for_address(&address);
    HttpResponse::Ok().json(AddressTransactionsResponse {
        address,
        transactions,
    })
}
