use std::sync::Arc;

use crate::client::Client;
use crate::error::ClientResult;
use crate::fs_ops;

/// Runs once at login: fetch the server's file list via
/// `CMD_GET_SYNC_DIR`, download everything it names into the sync
/// directory, then seed the Watcher's snapshot from the resulting
/// directory state.
///
/// Files present locally but not on the server are left alone; the
/// Watcher uploads them on its first tick, preserving last-writer-wins.
pub(crate) async fn run(client: &Arc<Client>) -> ClientResult<()> {
    let remote = client.get_sync_dir().await?;
    for (name, _size) in remote {
        match client.download(&name).await {
            Ok(bytes) => {
                let path = client.sync_dir.join(&name);
                fs_ops::write_atomic(&path, &bytes)?;
            }
            Err(err) => {
                tracing::warn!(error = %err, file = %name, "initial sync download failed");
            }
        }
    }

    let snapshot = fs_ops::snapshot_dir(&client.sync_dir)?;
    let mut state = client.watcher_state.lock().await;
    state.mtimes = snapshot;
    Ok(())
}
