use actix_web::{HttpResponse, Responder, get, web};

use super::models::AppState;

#[get("/health/")]
pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "node_id": state.node.network().node_id(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
