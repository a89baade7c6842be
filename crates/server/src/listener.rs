use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use driftsync_store::Store;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::notifier::Notifier;
use crate::registry::Registry;
use crate::session;

/// Binds `config.bind` and serves connections until the process is asked
/// to shut down, one task per accepted connection.
pub async fn serve(config: ServerConfig) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!(bind = %config.bind, root = %config.root.display(), "listening");
    serve_listener(listener, config.root, config.read_timeout).await
}

/// Serve connections on an already-bound listener, storing files under
/// `root`. Split out from [`serve`] so tests can bind an ephemeral port
/// and learn its address before the accept loop takes over.
pub async fn serve_listener(
    listener: TcpListener,
    root: PathBuf,
    read_timeout: Duration,
) -> std::io::Result<()> {
    let store = Arc::new(Store::new(root));
    let registry = Arc::new(Registry::new());
    let notifier = Arc::new(Notifier::new(registry.clone()));

    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::debug!(%peer, "accepted connection");

        let registry = registry.clone();
        let store = store.clone();
        let notifier = notifier.clone();
        tokio::spawn(async move {
            session::run(stream, registry, store, notifier, read_timeout).await;
        });
    }
}
