use actix_web::{HttpResponse, Responder, get, web};

use super::models::AppState;

#[get("/status/")]
pub async fn get_status(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.node.status())
}
