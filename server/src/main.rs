use std::sync::Arc;

use filehub_server::{handlers::serve, ServerConfig, ServerCtx};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match ServerConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config: {:?}", e);
            return;
        }
    };
    println!("🔧 Configuration Loaded");

    let ctx = match ServerCtx::new(config.clone()) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            eprintln!("Failed to prepare storage: {:?}", e);
            return;
        }
    };

    let server_address = config.get_addr();
    let listener = match TcpListener::bind(&server_address).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {}: {:?}", server_address, e);
            return;
        }
    };
    println!("🚀 Server listening on {}", &server_address);

    serve(listener, ctx).await;
}
