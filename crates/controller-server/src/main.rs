//! # controller-server
//!
//! Process entry point: loads `Config` from a TOML file, wires every
//! component crate into a [`Container`], and serves the SSE Gateway's HTTP
//! surface plus liveness/readiness probes.
//!
//! The HTTP router, request binding/validation, audit log, and every other
//! item in spec §1's excluded list are NOT here — those are external
//! collaborators this binary does not implement.

mod container;
mod providers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use controller_core::{Config, KeyVersion};
use controller_crypto::StaticKeyProvider;
use tracing::info;

use crate::container::Container;

#[derive(Debug, Parser)]
#[command(name = "controller-server", about = "Multi-cloud controller core: process entry point")]
struct Cli {
    /// Path to the TOML configuration file (master key material, deadlines, pool sizes).
    #[arg(long, env = "CONTROLLER_CONFIG")]
    config: std::path::PathBuf,

    /// Address the HTTP server binds to.
    #[arg(long, env = "CONTROLLER_ADDR", default_value = "0.0.0.0:8080")]
    addr: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;
    config.validate()?;

    let key_provider = build_key_provider(&config);
    let container = Arc::new(Container::builder().config(Arc::new(config)).key_provider(key_provider).build());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics).with_state(container.clone()))
        .merge(controller_sse::router(container.sse_gateway.clone()));

    let listener = tokio::net::TcpListener::bind(cli.addr).await?;
    info!(addr = %cli.addr, "controller-server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

fn build_key_provider(config: &Config) -> Arc<dyn controller_crypto::KeyProvider> {
    let entries: Vec<(KeyVersion, [u8; 32], bool)> =
        config.master_key_versions.iter().map(|entry| (entry.version, *entry.key, entry.current)).collect();
    Arc::new(StaticKeyProvider::new(entries))
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz() -> impl IntoResponse {
    StatusCode::OK
}

async fn metrics(State(container): State<Arc<Container>>) -> impl IntoResponse {
    Json(container.metrics())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    info!("shutdown signal received");
}
