use actix_web::{HttpResponse, Responder, post};
use log::debug;
use serde::Serialize;

use crate::wallet::generate_keypair_hex;

#[derive(Serialize)]
struct NewWalletResponse {
    private_key: String,
    public_key: String,
    address: String,
}

/// DEV helper: fresh secp256k1 keypair and its ledger address. The secret key
/// is returned in the clear.
#[post("/wallet/new/")]
pub async fn create_wallet() -> impl Responder {
    let (private_key, public_key, address) = generate_keypair_hex();
    debug!("WALLET - generated address {}", address);
    HttpResponse::Ok().json(NewWalletResponse {
        private_key,
        public_key,
        address,
    })
}
