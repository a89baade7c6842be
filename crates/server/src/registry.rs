use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use driftsync_protocol::Username;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;

/// Maximum number of concurrent sessions admitted for one username.
pub const MAX_SESSIONS_PER_USER: usize = 2;

/// A session's write half, boxed so the registry does not need to know the
/// concrete stream type (a real `TcpStream` half in production, an
/// in-memory duplex half in tests).
pub type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Identifies one session within the registry. Opaque outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

/// A registered session's write half, shared with the notifier so it can
/// deliver `SYNC_NOTIFICATION` frames without routing through the owning
/// session's task.
#[derive(Clone)]
struct Handle {
    id: SessionId,
    write: Arc<Mutex<BoxedWriter>>,
}

/// The shared table of logged-in sessions, keyed by username.
///
/// A single mutex guards the whole table; lookups and mutations are
/// O(active sessions for that user), never O(all sessions).
pub struct Registry {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<Username, Vec<Handle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Attempt to admit a new session for `user`. Returns `Some(id)` if
    /// admitted, `None` if the per-user session cap is already reached.
    pub async fn register(&self, user: &Username, write: Arc<Mutex<BoxedWriter>>) -> Option<SessionId> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.entry(user.clone()).or_default();
        if entry.len() >= MAX_SESSIONS_PER_USER {
            return None;
        }
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        entry.push(Handle { id, write });
        Some(id)
    }

    /// Remove a session. No-op if it is already gone.
    pub async fn unregister(&self, user: &Username, id: SessionId) {
        let mut sessions = self.sessions.lock().await;
        if let Some(entry) = sessions.get_mut(user) {
            entry.retain(|handle| handle.id != id);
            if entry.is_empty() {
                sessions.remove(user);
            }
        }
    }

    /// Write handles for every other session currently registered for
    /// `user`, excluding `origin`. Snapshotted under the lock and returned
    /// by value so the caller never writes to a socket while holding the
    /// registry mutex.
    pub async fn siblings_of(&self, user: &Username, origin: SessionId) -> Vec<Arc<Mutex<BoxedWriter>>> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(user)
            .map(|entry| {
                entry
                    .iter()
                    .filter(|handle| handle.id != origin)
                    .map(|handle| handle.write.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_protocol::{recv_frame, send_frame, Frame, FrameType};
    use tokio::io::duplex;

    fn user(s: &str) -> Username {
        Username::parse(s).unwrap()
    }

    fn boxed_writer<W: AsyncWrite + Unpin + Send + 'static>(w: W) -> Arc<Mutex<BoxedWriter>> {
        Arc::new(Mutex::new(Box::new(w) as BoxedWriter))
    }

    #[tokio::test]
    async fn admits_up_to_the_cap_and_rejects_the_third() {
        let registry = Registry::new();
        let u = user("alice");
        let (_a1, b1) = duplex(64);
        let (_a2, b2) = duplex(64);
        let (_a3, b3) = duplex(64);

        assert!(registry.register(&u, boxed_writer(b1)).await.is_some());
        assert!(registry.register(&u, boxed_writer(b2)).await.is_some());
        assert!(registry.register(&u, boxed_writer(b3)).await.is_none());
    }

    #[tokio::test]
    async fn unregister_frees_a_slot() {
        let registry = Registry::new();
        let u = user("alice");
        let (_a1, b1) = duplex(64);
        let (_a2, b2) = duplex(64);

        let id1 = registry.register(&u, boxed_writer(b1)).await.unwrap();
        registry.register(&u, boxed_writer(b2)).await.unwrap();
        registry.unregister(&u, id1).await;

        let (_a3, b3) = duplex(64);
        assert!(registry.register(&u, boxed_writer(b3)).await.is_some());
    }

    #[tokio::test]
    async fn siblings_excludes_origin() {
        let registry = Registry::new();
        let u = user("alice");
        let (_a1, b1) = duplex(2048);
        let (mut a2, b2) = duplex(2048);

        let id1 = registry.register(&u, boxed_writer(b1)).await.unwrap();
        registry.register(&u, boxed_writer(b2)).await.unwrap();

        let siblings = registry.siblings_of(&u, id1).await;
        assert_eq!(siblings.len(), 1);
        {
            let mut w = siblings[0].lock().await;
            send_frame(&mut *w, &Frame::single(FrameType::SyncNotification, 0, b"U:x"))
                .await
                .unwrap();
        }
        let got = recv_frame(&mut a2).await.unwrap();
        assert_eq!(got.body(), b"U:x");
    }
}
