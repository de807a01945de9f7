//! Server configuration.

use anyhow::Context;
use clap::Parser;
use fbrun_manager::Manager;
use fbrun_runtime::{BlockRegistry, EngineConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Command-line and environment configuration of the host process
#[derive(Debug, Clone, Parser)]
#[command(name = "fbrun-server")]
#[command(about = "fbrun function block runtime", long_about = None)]
pub struct ServerConfig {
    /// Address the management transport listens on
    #[arg(short, long, env = "FBRUN_BIND", default_value = "127.0.0.1:61499")]
    pub bind: String,

    /// Milliseconds to wait for blocks to exit on KILL and DELETE
    #[arg(long, env = "FBRUN_STOP_TIMEOUT_MS", default_value_t = 5000)]
    pub stop_timeout_ms: u64,

    /// Configuration created at startup
    #[arg(long, env = "FBRUN_BASE_RESOURCE")]
    pub base_resource: Option<String>,

    /// Type tag of the startup configuration
    #[arg(long, env = "FBRUN_BASE_RESOURCE_TYPE", default_value = "EMB_RES")]
    pub base_resource_type: String,

    /// Log filter used when `RUST_LOG` is not set
    #[arg(long, env = "FBRUN_LOG", default_value = "fbrun=info")]
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:61499".to_string(),
            stop_timeout_ms: 5000,
            base_resource: None,
            base_resource_type: "EMB_RES".to_string(),
            log_filter: "fbrun=info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Engine settings derived from the flags
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default().with_stop_timeout(Duration::from_millis(self.stop_timeout_ms))
    }

    /// Build the manager with the built-in block library and the
    /// startup configuration, if any
    ///
    /// # Errors
    ///
    /// Returns error if the startup configuration cannot be created
    pub fn build_manager(&self) -> anyhow::Result<Manager> {
        let manager = Manager::new(Arc::new(BlockRegistry::with_builtins()))
            .with_config(self.engine_config());

        info!(block_types = ?manager.registry().list(), "block library loaded");

        if let Some(name) = &self.base_resource {
            manager
                .create_configuration(name, &self.base_resource_type)
                .with_context(|| format!("creating base resource {}", name))?;
        }
        Ok(manager)
    }
}
