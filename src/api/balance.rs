use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, BalanceResponse};

/// Confirmed balance: credits minus debits over every block.
#[get("/balance/{address}/")]
pub async fn get_balance(state: web::Data<AppState>, path: web::Path<(String,)>) -> impl Responder {
    let address = path.into_inner().0;
    let balance = state.node.balance_of(&address);
    HttpResponse::Ok().json(BalanceResponse { address, balance })
}
