//! Registry subcommand implementation

use anyhow::Result;
use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use vaultfs_common::RegistryConfig;
use vaultfs_registry::RegistryServer;

#[derive(Args, Debug)]
pub struct RegistryArgs {
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

pub async fn run(args: RegistryArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => RegistryConfig::load(path)?,
        None => RegistryConfig::default(),
    };
    if config.server.port == 0 {
        config.server.port = vaultfs_common::constants::DEFAULT_REGISTRY_PORT;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.token.is_some() {
        config.auth.token = args.token;
    }

    info!("Starting VaultFS registry v{}", env!("CARGO_PKG_VERSION"));
    let bind = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let server = RegistryServer::new(bind, config.auth.token, config.heartbeat.timeout_ms);

    tokio::select! {
        result = server.run() => result.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down registry");
            Ok(())
        }
    }
}
