use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// How long a session worker waits for the first (`CMD_LOGIN`) frame
/// before giving up on a connection that never authenticates.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Server configuration. Callers normally build this from CLI flags with
/// environment variables (`DRIFTSYNC_BIND`, `DRIFTSYNC_ROOT`) as fallback
/// defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub root: PathBuf,
    pub read_timeout: Duration,
}

impl ServerConfig {
    pub fn from_env_or(bind: SocketAddr, root: PathBuf) -> Self {
        let bind = std::env::var("DRIFTSYNC_BIND")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(bind);
        let root = std::env::var("DRIFTSYNC_ROOT")
            .ok()
            .map(PathBuf::from)
            .unwrap_or(root);
        Self {
            bind,
            root,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}
