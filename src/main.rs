use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::{error, info};

use pow_ledger_node::api::{self, AppState};
use pow_ledger_node::{Node, NodeConfig};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = NodeConfig::from_env();
    let (host, port) = (config.host.clone(), config.port);

    let node = Arc::new(Node::new(config));
    if let Err(e) = node.start().await {
        error!("Failed to start P2P network: {}", e);
        return Err(std::io::Error::other(e.to_string()));
    }

    info!("⛓️ Starting blockchain API at http://{host}:{port}");

    let state = web::Data::new(AppState::new(node.clone()));
    let result = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await;

    if let Err(e) = node.stop() {
        error!("Failed to save ledger on shutdown: {}", e);
    }
    result
}
