use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use driftsync_protocol::{recv_frame, FrameType};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

use crate::router::Routes;

/// Owns the connection's read half exclusively. Every inbound frame is
/// either routed to a waiting command issuer (by `seqn`) or, if unclaimed
/// and of type `SYNC_NOTIFICATION`, forwarded to the notification handler.
///
/// Unsolicited notifications are sent by the server with `seqn == 0`,
/// which a command issuer never uses (the sequence counter starts at 1),
/// so the two paths never collide even though `CMD_GET_SYNC_DIR`'s
/// per-file announcements reuse the `SYNC_NOTIFICATION` frame type on the
/// requesting command's own `seqn`.
pub(crate) async fn run<R>(mut read: R, routes: Arc<Routes>, notifications: mpsc::Sender<driftsync_protocol::Frame>, alive: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin + Send,
{
    loop {
        match recv_frame(&mut read).await {
            Ok(frame) => {
                if let Some(orphan) = routes.route(frame).await {
                    if orphan.frame_type == FrameType::SyncNotification {
                        if notifications.send(orphan).await.is_err() {
                            tracing::warn!("notification handler channel closed, dropping notification");
                        }
                    } else {
                        tracing::debug!(seqn = orphan.seqn, "dropped frame with no waiter");
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "reader lost connection");
                alive.store(false, Ordering::SeqCst);
                routes.fail_all().await;
                break;
            }
        }
    }
}
