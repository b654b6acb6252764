//! Gated funding server: entry point.
//!
//! Serves the campaign REST API over a SQLite-backed [`FundingService`].
//! When `CONTRACT_ID` is configured, a background indexer also polls the
//! Soroban `getEvents` RPC and records on-chain donations in the same ledger.

mod api;
mod config;
mod db;
mod errors;
mod events;
mod indexer;
mod rpc;

use std::sync::Arc;

use gated_funding::FundingService;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use db::SqliteStore;
use indexer::IndexerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;
    let service = FundingService::new(Arc::new(SqliteStore::new(pool.clone())));
    let shutdown = CancellationToken::new();

    // ─── Background indexer ───────────────────────────────
    let indexer = match config.chain.clone() {
        Some(chain) => {
            let client = Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()?;
            let state = Arc::new(IndexerState {
                service: service.clone(),
                pool,
                config: chain,
                client,
            });
            Some(tokio::spawn(indexer::run(state, shutdown.clone())))
        }
        None => {
            info!("CONTRACT_ID not set; chain indexer disabled");
            None
        }
    };

    // ─── REST API ─────────────────────────────────────────
    let app = api::router(api::ApiState { service })
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await?;

    if let Some(handle) = indexer {
        handle.await?;
    }

    Ok(())
}
