use clap::Parser;
use querysieve_server::{router, AppState, Config};
use querysieve_storage::{InMemoryStore, Seed};
use std::collections::BTreeMap;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .init();

    let state = match &config.data {
        Some(path) => AppState::from_seed(&Seed::load(path)?)?,
        None => {
            warn!("no seed file given, serving an empty store");
            AppState::new(InMemoryStore::new(), BTreeMap::new())?
        }
    };

    let addr = config.addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("http listening on {}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
