//! Name-service subcommand implementation

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use tracing::info;
use vaultfs_common::NameConfig;
use vaultfs_name::NameServer;

#[derive(Args, Debug)]
pub struct NameArgs {
    /// Path to the YAML configuration file
    #[arg(long, env = "VAULTFS_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured port
    #[arg(long, env = "VAULTFS_PORT")]
    port: Option<u16>,

    /// Shared bearer token
    #[arg(long, env = "VAULTFS_TOKEN")]
    token: Option<String>,
}

pub async fn run(args: NameArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => NameConfig::load(path)?,
        None => NameConfig::default(),
    };
    if config.server.port == 0 {
        config.server.port = vaultfs_common::constants::DEFAULT_NAME_PORT;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.token.is_some() {
        config.auth.token = args.token;
    }

    info!("Starting VaultFS name service v{}", env!("CARGO_PKG_VERSION"));
    let server = NameServer::new(&config).await?;

    tokio::select! {
        result = server.run() => result.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down name service");
            Ok(())
        }
    }
}
