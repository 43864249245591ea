use dotenvy::dotenv;
use log::*;
use recon_server::{config::ServerConfig, server::run_server};

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_env_or_default();
    info!("🚀️ Starting payment reconciliation server on {}:{}", config.host, config.port);
    match run_server(config).await {
        Ok(_) => info!("🚀️ Server shut down gracefully"),
        Err(e) => error!("🚀️ Server exited with an error: {e}"),
    }
}
