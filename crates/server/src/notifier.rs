use std::sync::Arc;
use std::time::Duration;

use driftsync_protocol::{send_frame, Frame, FrameType, Username};

use crate::registry::{Registry, SessionId};

/// How long a notification send may block on a contended sibling socket
/// before being dropped.
const NOTIFY_TIMEOUT: Duration = Duration::from_millis(200);

/// The kind of change a session caused, as surfaced to its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Update,
    Delete,
}

impl ChangeKind {
    fn prefix(self) -> char {
        match self {
            ChangeKind::Update => 'U',
            ChangeKind::Delete => 'D',
        }
    }
}

/// Fans a change event out to every sibling session of the originating
/// one, without ever holding the registry's lock while sending.
pub struct Notifier {
    registry: Arc<Registry>,
}

impl Notifier {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Notify every other session of `user` about a change to `filename`.
    /// The origin session receives nothing. Sends are best-effort: a
    /// sibling whose write half is already busy (mid-response) or slow to
    /// accept the write is skipped and logged, never awaited indefinitely,
    /// so this call never blocks the caller on a wedged sibling.
    pub async fn notify(&self, user: &Username, origin: SessionId, kind: ChangeKind, filename: &str) {
        let siblings = self.registry.siblings_of(user, origin).await;
        if siblings.is_empty() {
            return;
        }
        let payload = format!("{}:{filename}", kind.prefix());
        let frame = Frame::single(FrameType::SyncNotification, 0, payload.as_bytes());

        for write in siblings {
            let Ok(mut guard) = write.try_lock() else {
                tracing::warn!(user = %user, file = filename, "dropped notification: sibling socket busy");
                continue;
            };
            let result = tokio::time::timeout(NOTIFY_TIMEOUT, send_frame(&mut *guard, &frame)).await;
            if result.is_err() || matches!(result, Ok(Err(_))) {
                tracing::warn!(user = %user, file = filename, "dropped notification: sibling send failed or timed out");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use driftsync_protocol::recv_frame;
    use tokio::io::{duplex, AsyncWrite};
    use tokio::sync::Mutex;

    fn boxed_writer<W: AsyncWrite + Unpin + Send + 'static>(
        w: W,
    ) -> Arc<Mutex<crate::registry::BoxedWriter>> {
        Arc::new(Mutex::new(Box::new(w) as crate::registry::BoxedWriter))
    }

    #[tokio::test]
    async fn notifies_siblings_with_prefixed_payload() {
        let registry = Arc::new(Registry::new());
        let user = Username::parse("alice").unwrap();
        let (_a1, b1) = duplex(2048);
        let (mut a2, b2) = duplex(2048);
        let id1 = registry.register(&user, boxed_writer(b1)).await.unwrap();
        registry.register(&user, boxed_writer(b2)).await.unwrap();

        let notifier = Notifier::new(registry);
        notifier
            .notify(&user, id1, ChangeKind::Update, "report.csv")
            .await;

        let frame = recv_frame(&mut a2).await.unwrap();
        assert_eq!(frame.frame_type, FrameType::SyncNotification);
        assert_eq!(frame.body(), b"U:report.csv");
    }

    #[tokio::test]
    async fn busy_sibling_socket_does_not_block_or_panic() {
        let registry = Arc::new(Registry::new());
        let user = Username::parse("alice").unwrap();
        let (_a1, b1) = duplex(2048);
        let (_a2, b2) = duplex(2048);
        let id1 = registry.register(&user, boxed_writer(b1)).await.unwrap();
        let write2 = boxed_writer(b2);
        registry.register(&user, write2.clone()).await.unwrap();

        let _guard = write2.lock().await;
        let notifier = Notifier::new(registry);
        notifier
            .notify(&user, id1, ChangeKind::Delete, "gone.txt")
            .await;
    }
}
