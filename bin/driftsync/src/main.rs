use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use driftsync_client::{Client, ClientConfig};
use driftsync_protocol::Username;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Connect to a driftsync server and keep a local directory in sync with
/// it, while accepting a handful of manual commands on stdin.
#[derive(Parser, Debug)]
struct Args {
    /// Account to log in as. Falls back to DRIFTSYNC_USER.
    #[arg(long)]
    user: Option<String>,

    /// Server address, e.g. 127.0.0.1:7878. Falls back to DRIFTSYNC_SERVER.
    #[arg(long, default_value = "127.0.0.1:7878")]
    server: SocketAddr,

    /// Local sync directory. Defaults to ./sync_dir_<user>.
    #[arg(long)]
    sync_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let user = args
        .user
        .map(Username::parse)
        .transpose()
        .context("invalid --user")?
        .unwrap_or_else(|| Username::parse("default").expect("literal is valid"));
    let sync_dir = args
        .sync_dir
        .unwrap_or_else(|| PathBuf::from(format!("sync_dir_{}", user)));

    let config = ClientConfig::from_env_or(args.server, user, sync_dir);
    tracing::info!(server = %config.server, user = %config.user, sync_dir = %config.sync_dir.display(), "connecting");

    let client = Client::connect(config).await?;
    run_command_loop(client).await
}

async fn run_command_loop(client: std::sync::Arc<Client>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("connected. commands: list | upload <file> | download <file> | delete <file> | exit");

    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("list") => match client.list().await {
                Ok(files) => {
                    for file in files {
                        println!("{}\t{}", file.name, file.size);
                    }
                }
                Err(err) => eprintln!("list failed: {err}"),
            },
            Some("upload") => {
                let Some(name) = parts.next() else {
                    eprintln!("usage: upload <file>");
                    continue;
                };
                match tokio::fs::read(client.sync_dir_path().join(name)).await {
                    Ok(bytes) => {
                        if let Err(err) = client.upload(name, &bytes).await {
                            eprintln!("upload failed: {err}");
                        }
                    }
                    Err(err) => eprintln!("could not read {name}: {err}"),
                }
            }
            Some("download") => {
                let Some(name) = parts.next() else {
                    eprintln!("usage: download <file>");
                    continue;
                };
                match client.download(name).await {
                    Ok(bytes) => {
                        if let Err(err) = tokio::fs::write(client.sync_dir_path().join(name), bytes).await {
                            eprintln!("could not write {name}: {err}");
                        }
                    }
                    Err(err) => eprintln!("download failed: {err}"),
                }
            }
            Some("delete") => {
                let Some(name) = parts.next() else {
                    eprintln!("usage: delete <file>");
                    continue;
                };
                if let Err(err) = client.delete(name).await {
                    eprintln!("delete failed: {err}");
                }
            }
            Some("exit") | Some("quit") => break,
            Some(other) => eprintln!("unknown command: {other}"),
            None => {}
        }
    }
    Ok(())
}
