//! tilelog server binary
//!
//! Run with: `cargo run -p tilelog-server -- --help`

use clap::Parser;
use ed25519_dalek::SigningKey;
use std::sync::Arc;
use tilelog_core::{CheckpointSigner, Ed25519CheckpointSigner};
use tilelog_server::{build_router, AppState, ServerConfig};
use tilelog_storage::FileLogStorage;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.listen_addr,
        data_dir = %config.data_dir.display(),
        origin = %config.origin,
        "Starting tilelog server"
    );

    let signer = load_signer(&config)?;
    let storage = Arc::new(FileLogStorage::new(config.data_dir.clone()));
    let listen_addr = config.listen_addr.clone();
    let state = Arc::new(AppState::new(config, storage, vec![signer]));

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Load the Ed25519 checkpoint signer from the configured seed file.
fn load_signer(config: &ServerConfig) -> Result<Arc<dyn CheckpointSigner>, Box<dyn std::error::Error>> {
    let path = config
        .signing_key_file
        .as_ref()
        .ok_or("--signing-key-file is required")?;
    let hex_seed = std::fs::read_to_string(path)?;
    let seed_bytes = hex::decode(hex_seed.trim())
        .map_err(|e| format!("signing key file {}: {e}", path.display()))?;
    let seed: [u8; 32] = seed_bytes
        .as_slice()
        .try_into()
        .map_err(|_| format!("signing key must be 32 bytes, got {}", seed_bytes.len()))?;
    let signer = Ed25519CheckpointSigner::new(&config.origin, SigningKey::from_bytes(&seed))?;
    Ok(Arc::new(signer))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown handler");
    }
    tracing::info!("shutting down");
}
