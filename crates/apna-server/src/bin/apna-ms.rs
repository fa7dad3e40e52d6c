//! Management-service daemon entry point.

use std::net::SocketAddr;
use std::path::PathBuf;

use apna_core::{DirectoryService, MsConfig};
use apna_server::MsServer;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Run the APNA management service.
#[derive(Debug, Parser)]
#[command(name = "apna-ms", about = "APNA management service")]
struct Args {
    /// Path to the keyed JSON configuration blob.
    #[arg(long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let config = MsConfig::load(&args.config)?;
    let listen = SocketAddr::new(config.ip, config.port);
    let service = DirectoryService::new(config.keys()?);

    let server = MsServer::bind(listen, service).await?;
    server.serve().await?;
    Ok(())
}
