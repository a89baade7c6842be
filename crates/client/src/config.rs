use std::net::SocketAddr;
use std::path::PathBuf;

use driftsync_protocol::Username;

/// Client configuration. CLI flags normally win; environment variables
/// (`DRIFTSYNC_SERVER`, `DRIFTSYNC_USER`) are the fallback.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: SocketAddr,
    pub user: Username,
    pub sync_dir: PathBuf,
}

impl ClientConfig {
    pub fn from_env_or(server: SocketAddr, user: Username, sync_dir: PathBuf) -> Self {
        let server = std::env::var("DRIFTSYNC_SERVER")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(server);
        let user = std::env::var("DRIFTSYNC_USER")
            .ok()
            .and_then(|value| Username::parse(value).ok())
            .unwrap_or(user);
        Self {
            server,
            user,
            sync_dir,
        }
    }
}
