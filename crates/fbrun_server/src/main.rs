//! fbrun Server
//!
//! Runs a function block device reachable over the management transport.

#![warn(missing_docs)]
#![warn(clippy::all)]

use anyhow::Result;
use clap::Parser;
use fbrun_server::{Server, ServerConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    let manager = Arc::new(config.build_manager()?);
    let shutdown = CancellationToken::new();

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for interrupt");
            return;
        }
        info!("interrupt received, shutting down");
        signal.cancel();
    });

    let server = Server::new(Arc::clone(&manager));
    server.run(&config.bind, shutdown).await?;

    manager.shutdown().await;
    Ok(())
}
