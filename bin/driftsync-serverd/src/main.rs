use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use driftsync_server::ServerConfig;

/// Serve driftsync's file store over the network.
#[derive(Parser, Debug)]
struct Args {
    /// Address to bind, e.g. 0.0.0.0:7878. Falls back to DRIFTSYNC_BIND.
    #[arg(long, default_value = "0.0.0.0:7878")]
    bind: SocketAddr,

    /// Root directory under which each user gets a subdirectory. Falls
    /// back to DRIFTSYNC_ROOT.
    #[arg(long, default_value = "./driftsync-data")]
    root: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = ServerConfig::from_env_or(args.bind, args.root);

    driftsync_server::serve(config).await?;
    Ok(())
}
