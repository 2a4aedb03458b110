//! Guia Local server binary.
//!
//! Usage:
//!   cargo run --bin seed_data     # populate sample data
//!   cargo run --bin guia-local    # start the REST API
//!   # Then query via curl or the guia-cli binary

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use guia_local::config::Config;
use guia_local::rest::create_router;
use guia_local::storage::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env is optional; real deployments set the environment directly
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load();
    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();

    let store = Store::open(&config.data_dir)?;
    tracing::info!(data_dir = %config.data_dir, "storage aberto");

    let app = create_router(store, config);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "API de Negócios Locais no ar");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
