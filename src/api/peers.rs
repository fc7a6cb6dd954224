use actix_web::{HttpResponse, Responder, get, post, web};
use log::info;

use super::models::{AddPeerRequest, AddPeerResponse, AppState, ErrorResponse, SyncResponse};

#[get("/peers/")]
pub async fn get_peers(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.node.peers())
}

/// Register a peer; the node starts connecting to it right away.
#[post("/peers/")]
pub async fn add_peer(state: web::Data<AppState>, body: web::Json<AddPeerRequest>) -> impl Responder {
    let AddPeerRequest { address, port } = body.into_inner();
    let peer_id = format!("{address}:{port}");
    match state.node.add_peer(&address, port) {
        Ok(added) => {
            info!("POST /peers/ - {} (added={})", peer_id, added);
            HttpResponse::Ok().json(AddPeerResponse { peer_id, added })
        }
        Err(e) => HttpResponse::BadRequest().json(ErrorResponse::new(e)),
    }
}

/// Ask every connected peer for its chain; longer valid chains replace ours.
#[post("/sync/")]
pub async fn sync_chain(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(SyncResponse {
        requested_from: state.node.sync(),
    })
}
