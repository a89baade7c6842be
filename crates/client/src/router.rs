use std::collections::HashMap;

use driftsync_protocol::Frame;
use tokio::sync::{mpsc, Mutex};

/// Capacity of each per-command response channel. Generous enough to hold
/// a header plus a burst of `DATA_PACKET`/`SYNC_NOTIFICATION` frames
/// without the reader blocking on a slow command issuer.
const ROUTE_CAPACITY: usize = 256;

/// The response routing table: `seqn -> channel`, registered by a command
/// issuer before it writes its request so the single reader task always
/// has somewhere to deliver the reply.
pub(crate) struct Routes {
    table: Mutex<HashMap<u16, mpsc::Sender<Frame>>>,
}

impl Routes {
    pub(crate) fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn register(&self, seqn: u16) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(ROUTE_CAPACITY);
        self.table.lock().await.insert(seqn, tx);
        rx
    }

    pub(crate) async fn remove(&self, seqn: u16) {
        self.table.lock().await.remove(&seqn);
    }

    /// Deliver `frame` to its waiter, if any is registered. Returns the
    /// frame back to the caller when there is no waiter, so it can be
    /// handed to the notification handler instead.
    pub(crate) async fn route(&self, frame: Frame) -> Option<Frame> {
        let table = self.table.lock().await;
        match table.get(&frame.seqn) {
            Some(tx) => {
                let _ = tx.send(frame).await;
                None
            }
            None => Some(frame),
        }
    }

    /// Drop every registered channel, waking any waiter with a closed
    /// channel. Called once the reader observes the connection is gone.
    pub(crate) async fn fail_all(&self) {
        self.table.lock().await.clear();
    }
}
