//! Border-element forwarder entry point.

use std::net::SocketAddr;
use std::path::PathBuf;

use apna_client::MsConnector;
use apna_core::MsConfig;
use apna_server::Forwarder;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Run the APNA border-element forwarder.
#[derive(Debug, Parser)]
#[command(name = "apna-fwd", about = "APNA border-element forwarder")]
struct Args {
    /// Path to the keyed JSON configuration blob (shared with the
    /// management service).
    #[arg(long)]
    config: PathBuf,

    /// Data-plane listen address.
    #[arg(long)]
    listen: SocketAddr,

    /// Management-service address for fallback lookups.
    #[arg(long)]
    ms: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let config = MsConfig::load(&args.config)?;
    let connector = MsConnector::connect(args.ms).await?;

    let forwarder = Forwarder::bind(args.listen, config.keys()?, connector).await?;
    forwarder.run().await;
    Ok(())
}
