// Use mimalloc as the global allocator for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "VaultFS content-addressed store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the node-discovery registry
    Registry(commands::registry::RegistryArgs),
    /// Run a name service (metadata and admission control)
    Name(commands::name::NameArgs),
    /// Run a data service (blob storage)
    Data(commands::data::DataArgs),
}

fn init_logging() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Registry(args) => commands::registry::run(args).await,
        Commands::Name(args) => commands::name::run(args).await,
        Commands::Data(args) => commands::data::run(args).await,
    }
}
