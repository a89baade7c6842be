use std::sync::Arc;

use driftsync_protocol::Frame;
use tokio::sync::mpsc;

use crate::client::Client;
use crate::fs_ops;

/// Capacity of the channel the reader uses to hand unsolicited
/// `SYNC_NOTIFICATION` frames to this handler.
pub(crate) const NOTIFY_CAPACITY: usize = 64;

/// Applies server-initiated changes delivered as unsolicited
/// `SYNC_NOTIFICATION` frames: downloads updated files, removes deleted
/// ones, and keeps the Watcher's mtime table in lockstep so the next tick
/// does not re-upload what was just installed.
pub(crate) async fn run(client: Arc<Client>, mut notifications: mpsc::Receiver<Frame>) {
    while let Some(frame) = notifications.recv().await {
        let body = frame.body_str().into_owned();
        let Some((action, name)) = body.split_once(':') else {
            tracing::warn!(payload = %body, "malformed notification payload");
            continue;
        };

        match action {
            "U" => {
                if let Err(err) = apply_update(&client, name).await {
                    tracing::warn!(error = %err, file = name, "failed to apply update notification");
                }
            }
            "D" => {
                apply_delete(&client, name).await;
            }
            other => {
                tracing::warn!(action = other, "unknown notification action");
            }
        }
    }
}

async fn apply_update(client: &Arc<Client>, name: &str) -> crate::error::ClientResult<()> {
    let bytes = client.download(name).await?;

    // Serialized against the Watcher: hold the mtime table lock across the
    // write-then-record so a tick running concurrently always sees either
    // the old file and the old mtime, or the new file and the new mtime.
    let mut state = client.watcher_state.lock().await;
    let path = client.sync_dir.join(name);
    fs_ops::write_atomic(&path, &bytes)?;
    let mtime = fs_ops::mtime_of(&path)?;
    state.mtimes.insert(name.to_string(), mtime);
    Ok(())
}

async fn apply_delete(client: &Arc<Client>, name: &str) {
    let mut state = client.watcher_state.lock().await;
    let path = client.sync_dir.join(name);
    let _ = std::fs::remove_file(&path);
    state.mtimes.remove(name);
}
