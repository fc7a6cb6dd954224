mod balance;
mod chain;
mod health;
pub mod models;
mod peers;
mod status;
mod tx;
mod wallet;

use actix_web::error::InternalError;
use actix_web::web::{self, ServiceConfig};
use actix_web::HttpResponse;

pub use models::AppState;
use models::ErrorResponse;

pub fn init_routes(cfg: &mut ServiceConfig) {
    let json = web::JsonConfig::default().error_handler(|err, _req| {
        let body = HttpResponse::BadRequest().json(ErrorResponse::new(&err));
        InternalError::from_response(err, body).into()
    });

    cfg.app_data(json).service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(chain::get_chain)
            .service(chain::validate_chain)
            .service(chain::mine_block)
            .service(chain::cancel_mining)
            .service(tx::post_faucet)
            .service(tx::post_transaction)
            .service(tx::get_pool)
            .service(tx::get_transactions_by_address)
            .service(tx::get_transaction)
            .service(balance::get_balance)
            .service(peers::get_peers)
            .service(peers::add_peer)
            .service(peers::sync_chain)
            .service(status::get_status)
            .service(wallet::create_wallet),
    );
}
