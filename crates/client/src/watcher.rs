use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;

use crate::client::Client;
use crate::fs_ops;

/// How often the watcher polls the sync directory. Polling keeps the
/// dependency surface small and the snapshot-diff logic simple; a kernel
/// event watcher would need its own debounce and coalescing layer for
/// little benefit at this scale.
const TICK: Duration = Duration::from_secs(1);

/// Periodically diffs the sync directory against its previous snapshot,
/// uploading anything new or changed and deleting on the server anything
/// that disappeared locally.
pub(crate) async fn run(client: Arc<Client>) {
    let mut tick = interval(TICK);
    loop {
        tick.tick().await;
        if let Err(err) = run_once(&client).await {
            tracing::warn!(error = %err, "watcher tick failed");
        }
    }
}

async fn run_once(client: &Arc<Client>) -> crate::error::ClientResult<()> {
    // Hold the mtime table lock across the scan itself, not just the
    // swap: if the notification handler installs a file and records its
    // mtime between our scan and our swap, a replace here would discard
    // that fresh entry and the file would look "changed" (and get
    // re-uploaded) on the next tick.
    let mut state = client.watcher_state.lock().await;
    let current = fs_ops::snapshot_dir(&client.sync_dir)?;
    let previous = std::mem::replace(&mut state.mtimes, current.clone());
    drop(state);

    for (name, mtime) in &current {
        let changed = previous.get(name).map(|prev| prev != mtime).unwrap_or(true);
        if changed {
            let path = client.sync_dir.join(name);
            match std::fs::read(&path) {
                Ok(bytes) => {
                    if let Err(err) = client.upload(name, &bytes).await {
                        tracing::warn!(error = %err, file = name, "watcher upload failed");
                    }
                }
                Err(err) => {
                    tracing::debug!(error = %err, file = name, "watcher could not read file, skipping this tick");
                }
            }
        }
    }

    for name in previous.keys() {
        if !current.contains_key(name) {
            if let Err(err) = client.delete(name).await {
                tracing::debug!(error = %err, file = name, "watcher delete failed");
            }
        }
    }

    Ok(())
}
