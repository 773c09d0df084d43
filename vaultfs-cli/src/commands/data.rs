//! Data-service subcommand implementation

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use tracing::info;
use vaultfs_common::DataConfig;
use vaultfs_data::DataServer;

#[derive(Args, Debug)]
pub struct DataArgs {
    /// Path to the YAML configuration file
    #[arg(long, env = "VAULTFS_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured port
    #[arg(long, env = "VAULTFS_PORT")]
    port: Option<u16>,

    /// Shared bearer token
    #[arg(long, env = "VAULTFS_TOKEN")]
    token: Option<String>,

    /// Storage roots; may be given multiple times, overrides the config
    #[arg(long = "storage-path")]
    storage_paths: Vec<PathBuf>,
}

pub async fn run(args: DataArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => DataConfig::load(path)?,
        None => DataConfig::default(),
    };
    if config.server.port == 0 {
        config.server.port = vaultfs_common::constants::DEFAULT_DATA_PORT;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.token.is_some() {
        config.auth.token = args.token;
    }
    if !args.storage_paths.is_empty() {
        config.storage.paths = args.storage_paths;
    }

    info!("Starting VaultFS data service v{}", env!("CARGO_PKG_VERSION"));
    let server = DataServer::new(&config)?;

    tokio::select! {
        result = server.run() => result.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down data service; in-flight uploads left to GC");
            Ok(())
        }
    }
}
