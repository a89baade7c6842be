use std::sync::Arc;
use std::time::Duration;

use driftsync_protocol::{recv_frame, recv_frame_timeout, send_frame, Frame, FrameType, PAYLOAD_CAPACITY};
use driftsync_protocol::{FileName, Username};
use driftsync_store::{Store, StoreError};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::error::{SessionError, SessionResult};
use crate::notifier::{ChangeKind, Notifier};
use crate::registry::{BoxedWriter, Registry, SessionId};

const OK: &[u8] = b"OK";
const ERROR: &[u8] = b"ERROR";
const NOT_FOUND: &[u8] = b"NOT_FOUND";

/// Runs one client connection end to end: login, then command dispatch
/// until the peer disconnects, sends `CMD_EXIT`, or a framing error makes
/// the stream unusable.
///
/// One session worker owns the socket's read half exclusively; its write
/// half is shared (behind a lock) with the notifier so sibling sessions
/// can still receive `SYNC_NOTIFICATION` frames while this worker blocks
/// on a read.
pub async fn run(
    stream: TcpStream,
    registry: Arc<Registry>,
    store: Arc<Store>,
    notifier: Arc<Notifier>,
    read_timeout: Duration,
) {
    if let Err(err) = stream.set_nodelay(true) {
        tracing::debug!(error = %err, "failed to set TCP_NODELAY");
    }
    let (mut read, write) = stream.into_split();
    let write: Arc<Mutex<BoxedWriter>> = Arc::new(Mutex::new(Box::new(write) as BoxedWriter));

    let (user, id) = match login(&mut read, &write, &registry, &store, read_timeout).await {
        Ok(Some(admitted)) => admitted,
        Ok(None) => return,
        Err(err) => {
            tracing::warn!(error = %err, "session closed before login completed");
            return;
        }
    };

    let span = tracing::info_span!("session", user = %user);
    let _enter = span.enter();
    tracing::info!("session authenticated");

    loop {
        let frame = match recv_frame(&mut read).await {
            Ok(frame) => frame,
            Err(err) => {
                tracing::info!(error = %err, "session read failed, closing");
                break;
            }
        };

        match dispatch(&frame, &mut read, &write, &user, id, &store, &notifier).await {
            Ok(Outcome::Continue) => {}
            Ok(Outcome::Exit) => break,
            Err(err) => {
                tracing::warn!(error = %err, "terminal session error, closing");
                break;
            }
        }
    }

    registry.unregister(&user, id).await;
    tracing::info!("session closed");
}

async fn login<R>(
    read: &mut R,
    write: &Arc<Mutex<BoxedWriter>>,
    registry: &Arc<Registry>,
    store: &Arc<Store>,
    read_timeout: Duration,
) -> SessionResult<Option<(Username, SessionId)>>
where
    R: AsyncRead + Unpin,
{
    let frame = recv_frame_timeout(read, read_timeout).await?;
    if frame.frame_type != FrameType::CmdLogin {
        return Err(SessionError::Frame(driftsync_protocol::FrameError::ProtocolViolation(
            "first frame was not CMD_LOGIN".into(),
        )));
    }
    let user = match Username::parse(frame.body_str().into_owned()) {
        Ok(user) => user,
        Err(err) => return Err(SessionError::Frame(err)),
    };
    store.init_user(&user).await?;

    match registry.register(&user, write.clone()).await {
        Some(id) => {
            respond(write, &[Frame::single(FrameType::CmdLogin, frame.seqn, &[])]).await?;
            Ok(Some((user, id)))
        }
        None => {
            respond(
                write,
                &[Frame::single(
                    FrameType::CmdExit,
                    frame.seqn,
                    b"session limit reached for this user",
                )],
            )
            .await?;
            tracing::info!(user = %user, "rejected login: session limit reached");
            Ok(None)
        }
    }
}

enum Outcome {
    Continue,
    Exit,
}

async fn dispatch<R>(
    frame: &Frame,
    read: &mut R,
    write: &Arc<Mutex<BoxedWriter>>,
    user: &Username,
    id: SessionId,
    store: &Store,
    notifier: &Notifier,
) -> SessionResult<Outcome>
where
    R: AsyncRead + Unpin,
{
    match frame.frame_type {
        FrameType::CmdUpload => handle_upload(frame, read, write, user, id, store, notifier).await,
        FrameType::CmdDownload => handle_download(frame, write, user, store).await,
        FrameType::CmdDelete => handle_delete(frame, write, user, id, store, notifier).await,
        FrameType::CmdListServer => handle_list(frame, write, user, store).await,
        FrameType::CmdGetSyncDir => handle_get_sync_dir(frame, write, user, store).await,
        FrameType::CmdExit => {
            respond(write, &[Frame::single(FrameType::CmdExit, frame.seqn, OK)]).await?;
            Ok(Outcome::Exit)
        }
        other => Err(SessionError::Frame(driftsync_protocol::FrameError::ProtocolViolation(
            format!("unexpected frame type {other:?} outside of an active transfer"),
        ))),
    }
}

async fn handle_upload<R>(
    frame: &Frame,
    read: &mut R,
    write: &Arc<Mutex<BoxedWriter>>,
    user: &Username,
    id: SessionId,
    store: &Store,
    notifier: &Notifier,
) -> SessionResult<Outcome>
where
    R: AsyncRead + Unpin,
{
    let name = match FileName::parse(frame.body_str().into_owned()) {
        Ok(name) => name,
        Err(err) => return Err(SessionError::Frame(err)),
    };
    let total_size = frame.total_size as usize;

    let mut bytes = Vec::with_capacity(total_size.min(16 * 1024 * 1024));
    while bytes.len() < total_size {
        let part = recv_frame(read).await?;
        if part.frame_type != FrameType::DataPacket {
            return Err(SessionError::Frame(driftsync_protocol::FrameError::ProtocolViolation(
                "expected DATA_PACKET while receiving an upload body".into(),
            )));
        }
        if bytes.len() + part.body().len() > total_size {
            return Err(SessionError::Frame(driftsync_protocol::FrameError::ProtocolViolation(
                "upload body exceeded its advertised total_size".into(),
            )));
        }
        bytes.extend_from_slice(part.body());
    }

    match store.save(user, &name, &bytes).await {
        Ok(()) => {
            respond(write, &[Frame::single(FrameType::CmdUpload, frame.seqn, OK)]).await?;
            notifier.notify(user, id, ChangeKind::Update, name.as_str()).await;
        }
        Err(err) => {
            tracing::warn!(error = %err, file = %name, "upload save failed");
            respond(write, &[Frame::single(FrameType::CmdUpload, frame.seqn, ERROR)]).await?;
        }
    }
    Ok(Outcome::Continue)
}

async fn handle_download(
    frame: &Frame,
    write: &Arc<Mutex<BoxedWriter>>,
    user: &Username,
    store: &Store,
) -> SessionResult<Outcome> {
    let name = match FileName::parse(frame.body_str().into_owned()) {
        Ok(name) => name,
        Err(err) => return Err(SessionError::Frame(err)),
    };

    match store.read(user, &name).await {
        Ok(bytes) => {
            let mut frames = vec![Frame::new(
                FrameType::CmdDownload,
                frame.seqn,
                bytes.len() as u32,
                OK,
            )];
            frames.extend(chunk_into_frames(FrameType::DataPacket, frame.seqn, &bytes));
            respond(write, &frames).await?;
        }
        Err(StoreError::NotFound) => {
            respond(
                write,
                &[Frame::new(FrameType::CmdDownload, frame.seqn, 0, NOT_FOUND)],
            )
            .await?;
        }
        Err(err) => {
            tracing::warn!(error = %err, file = %name, "download read failed");
            respond(write, &[Frame::new(FrameType::CmdDownload, frame.seqn, 0, ERROR)]).await?;
        }
    }
    Ok(Outcome::Continue)
}

async fn handle_delete(
    frame: &Frame,
    write: &Arc<Mutex<BoxedWriter>>,
    user: &Username,
    id: SessionId,
    store: &Store,
    notifier: &Notifier,
) -> SessionResult<Outcome> {
    let name = match FileName::parse(frame.body_str().into_owned()) {
        Ok(name) => name,
        Err(err) => return Err(SessionError::Frame(err)),
    };

    match store.delete(user, &name).await {
        Ok(()) => {
            respond(write, &[Frame::single(FrameType::CmdDelete, frame.seqn, OK)]).await?;
            notifier.notify(user, id, ChangeKind::Delete, name.as_str()).await;
        }
        Err(StoreError::NotFound) => {
            respond(write, &[Frame::single(FrameType::CmdDelete, frame.seqn, NOT_FOUND)]).await?;
        }
        Err(err) => {
            tracing::warn!(error = %err, file = %name, "delete failed");
            respond(write, &[Frame::single(FrameType::CmdDelete, frame.seqn, ERROR)]).await?;
        }
    }
    Ok(Outcome::Continue)
}

async fn handle_list(
    frame: &Frame,
    write: &Arc<Mutex<BoxedWriter>>,
    user: &Username,
    store: &Store,
) -> SessionResult<Outcome> {
    let entries = store.list(user).await?;
    let mut payload = String::new();
    for entry in &entries {
        payload.push_str(&format!(
            "{},{},{},{},{}\n",
            entry.name, entry.size, entry.mtime, entry.atime, entry.ctime
        ));
    }
    let payload = payload.into_bytes();

    let header_len = payload.len().min(PAYLOAD_CAPACITY);
    let mut frames = vec![Frame::new(
        FrameType::CmdListServer,
        frame.seqn,
        payload.len() as u32,
        &payload[..header_len],
    )];
    if payload.len() > header_len {
        frames.extend(chunk_into_frames(
            FrameType::DataPacket,
            frame.seqn,
            &payload[header_len..],
        ));
    }
    respond(write, &frames).await?;
    Ok(Outcome::Continue)
}

async fn handle_get_sync_dir(
    frame: &Frame,
    write: &Arc<Mutex<BoxedWriter>>,
    user: &Username,
    store: &Store,
) -> SessionResult<Outcome> {
    let entries = store.list(user).await?;
    let mut frames = vec![Frame::new(
        FrameType::CmdGetSyncDir,
        frame.seqn,
        entries.len() as u32,
        OK,
    )];
    for entry in &entries {
        let payload = format!("U:{}", entry.name);
        frames.push(Frame::new(
            FrameType::SyncNotification,
            frame.seqn,
            entry.size as u32,
            payload.as_bytes(),
        ));
    }
    respond(write, &frames).await?;
    Ok(Outcome::Continue)
}

/// Split `bytes` into as many `PAYLOAD_CAPACITY`-sized frames as needed,
/// all tagged with `seqn` so the client can recognize them as part of the
/// same response.
fn chunk_into_frames(frame_type: FrameType, seqn: u16, bytes: &[u8]) -> Vec<Frame> {
    bytes
        .chunks(PAYLOAD_CAPACITY)
        .map(|chunk| Frame::single(frame_type, seqn, chunk))
        .collect()
}

/// Send every frame in `frames` while holding the write lock continuously,
/// so no sibling notification or other response can interleave with a
/// multi-frame response body.
async fn respond(write: &Arc<Mutex<BoxedWriter>>, frames: &[Frame]) -> SessionResult<()> {
    let mut guard = write.lock().await;
    for frame in frames {
        send_frame(&mut *guard, frame).await?;
    }
    guard.flush().await.map_err(driftsync_protocol::FrameError::from)?;
    Ok(())
}
