use actix_web::{HttpResponse, Responder, delete, get, post, web};
use log::{info, warn};

use super::models::{
    AppState, ChainResponse, ErrorResponse, MineRequest, MineResponse, ValidateResponse,
};
use crate::error::NodeError;

/// Get the full blockchain.
#[get("/chain/")]
pub async fn get_chain(state: web::Data<AppState>) -> impl Responder {
    let node = &state.node;
    let chain = node.chain();
    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        difficulty: node.difficulty(),
        chain,
    })
}

/// Validate the whole chain.
#[get("/validate/")]
pub async fn validate_chain(state: web::Data<AppState>) -> impl Responder {
    let node = &state.node;
    HttpResponse::Ok().json(ValidateResponse {
        valid: node.is_chain_valid(),
        length: node.chain_len(),
        difficulty: node.difficulty(),
    })
}

/// Start mining the pending pool in the background. Completion is observable
/// through `/chain/` and `/status/`.
#[post("/mine/")]
pub async fn mine_block(state: web::Data<AppState>, req: web::Json<MineRequest>) -> impl Responder {
    let miner_address = req.miner_address.trim().to_string();
    if miner_address.is_empty() {
        return HttpResponse::BadRequest().json(ErrorResponse::new("miner_address required"));
    }

    match state.node.start_mining(&miner_address) {
        Ok(job) => {
            info!("POST /mine/ - mining started for {}", job.miner_address);
            // The job reports through the ledger; its handle is not needed here.
            drop(job);
            HttpResponse::Accepted().json(MineResponse {
                message: "Mining started".to_string(),
                miner_address,
            })
        }
        Err(NodeError::MiningInProgress) => {
            warn!("POST /mine/ - rejected, already mining");
            HttpResponse::Conflict().json(ErrorResponse::new(NodeError::MiningInProgress))
        }
        Err(e) => HttpResponse::InternalServerError().json(ErrorResponse::new(e)),
    }
}

/// Cancel the running mining job, if any.
#[delete("/mine/")]
pub async fn cancel_mining(state: web::Data<AppState>) -> impl Responder {
    if state.node.cancel_mining() {
        HttpResponse::Ok().json(serde_json::json!({ "message": "Mining cancellation requested" }))
    } else {
        HttpResponse::NotFound().json(ErrorResponse::new("No mining in progress"))
    }
}
