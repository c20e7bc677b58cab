use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::{error, info};
use std::sync::{Arc, RwLock};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use pow_ledger::api::{self, AppState};
use pow_ledger::blockchain::Blockchain;
use pow_ledger::config::NodeConfig;
use pow_ledger::miner::MiningService;
use pow_ledger::network::PeerHub;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = NodeConfig::load()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    info!("mining genesis block at difficulty {}", config.difficulty);
    let chain = Arc::new(RwLock::new(Blockchain::new(config.difficulty)));

    // Peer listener + relay of every block the miner seals
    let peers = PeerHub::new();
    let listener = TcpListener::bind(("0.0.0.0", config.p2p_port)).await?;
    let server = peers.clone();
    tokio::spawn(async move {
        if let Err(e) = server.serve(listener).await {
            error!("P2P listener failed: {e}");
        }
    });

    let (announce, sealed) = mpsc::unbounded_channel();
    tokio::spawn(peers.relay(sealed));

    let miner = MiningService::spawn(chain.clone(), Some(announce));

    println!(
        "⛓️ Node running on port {}, REST API at http://{}:{}/api",
        config.p2p_port, config.host, config.rest_port
    );

    let state = web::Data::new(AppState::new(chain, miner));

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((config.host.as_str(), config.rest_port))?
    .run()
    .await
}
