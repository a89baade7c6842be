use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

use driftsync_protocol::{recv_frame, send_frame, Frame, FrameType, FrameError, Username, PAYLOAD_CAPACITY};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::notify::{self, NOTIFY_CAPACITY};
use crate::reader;
use crate::router::Routes;
use crate::watcher;

pub(crate) type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// One row of `CMD_LIST_SERVER`'s response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    pub size: u64,
    pub mtime: i64,
    pub atime: i64,
    pub ctime: i64,
}

/// The mtimes the Watcher last observed, shared with the Notification
/// Handler so a server-installed file is never echoed straight back as a
/// client-initiated upload on the next tick.
pub(crate) struct WatcherState {
    pub(crate) mtimes: HashMap<String, i64>,
}

/// A live connection to a driftsync server for one user: the send half,
/// the response routing table, the watcher's shared mtime table, and the
/// background tasks (reader, watcher, notification handler) that keep it
/// all moving.
pub struct Client {
    pub(crate) write: Mutex<BoxedWriter>,
    pub(crate) routes: Arc<Routes>,
    next_seqn: AtomicU16,
    pub(crate) alive: Arc<AtomicBool>,
    pub(crate) user: Username,
    server: SocketAddr,
    pub(crate) sync_dir: PathBuf,
    pub(crate) watcher_state: Mutex<WatcherState>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Connect to `config.server`, log in as `config.user`, run the
    /// initial sync, and start the watcher and notification handler.
    pub async fn connect(config: ClientConfig) -> ClientResult<Arc<Client>> {
        let (read_half, write_half) = raw_connect(config.server, &config.user).await?;

        let routes = Arc::new(Routes::new());
        let alive = Arc::new(AtomicBool::new(true));
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFY_CAPACITY);

        let reader_task = tokio::spawn(reader::run(
            Box::new(read_half) as BoxedReader,
            routes.clone(),
            notify_tx,
            alive.clone(),
        ));

        let client = Arc::new(Client {
            write: Mutex::new(Box::new(write_half) as BoxedWriter),
            routes,
            next_seqn: AtomicU16::new(1),
            alive,
            user: config.user,
            server: config.server,
            sync_dir: config.sync_dir,
            watcher_state: Mutex::new(WatcherState {
                mtimes: HashMap::new(),
            }),
            reader_task: Mutex::new(Some(reader_task)),
        });

        tokio::fs::create_dir_all(&client.sync_dir).await?;
        crate::initial_sync::run(&client).await?;

        tokio::spawn(notify::run(client.clone(), notify_rx));
        tokio::spawn(watcher::run(client.clone()));

        Ok(client)
    }

    /// Close the current connection and open a fresh one to the same
    /// server, resending `CMD_LOGIN`. Any commands that were in flight at
    /// the moment the old connection was lost have already failed; this
    /// only restores the ability to issue new ones.
    pub fn reconnect(
        self: &Arc<Self>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ClientResult<()>> + Send + '_>> {
        Box::pin(async move {
            let (read_half, write_half) = raw_connect(self.server, &self.user).await?;

            {
                let mut write = self.write.lock().await;
                *write = Box::new(write_half) as BoxedWriter;
            }
            self.routes.fail_all().await;

            let mut reader_task = self.reader_task.lock().await;
            if let Some(old) = reader_task.take() {
                old.abort();
            }
            let (notify_tx, notify_rx) = mpsc::channel(NOTIFY_CAPACITY);
            *reader_task = Some(tokio::spawn(reader::run(
                Box::new(read_half) as BoxedReader,
                self.routes.clone(),
                notify_tx,
                self.alive.clone(),
            )));
            drop(reader_task);

            // The old notification handler task exited when its channel's sender
            // was dropped along with the old reader; start a fresh one bound to
            // the new channel.
            tokio::spawn(notify::run(self.clone(), notify_rx));

            self.alive.store(true, Ordering::SeqCst);
            tracing::info!(user = %self.user, "reconnected");
            Ok(())
        })
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn sync_dir_path(&self) -> &std::path::Path {
        &self.sync_dir
    }

    fn next_seqn(&self) -> u16 {
        let seqn = self.next_seqn.fetch_add(1, Ordering::Relaxed);
        if seqn == 0 {
            self.next_seqn.fetch_add(1, Ordering::Relaxed)
        } else {
            seqn
        }
    }

    /// Write `frames` to the connection under the send mutex, in order,
    /// without interleaving another command issuer's request between
    /// them.
    async fn send_all(&self, frames: &[Frame]) -> ClientResult<()> {
        let mut write = self.write.lock().await;
        for frame in frames {
            send_frame(&mut *write, frame).await?;
        }
        write.flush().await.map_err(FrameError::from)?;
        Ok(())
    }

    async fn await_header(&self, rx: &mut mpsc::Receiver<Frame>) -> ClientResult<Frame> {
        rx.recv().await.ok_or(ClientError::ConnectionLost)
    }

    async fn drain_body(&self, rx: &mut mpsc::Receiver<Frame>, total: usize) -> ClientResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(total);
        while bytes.len() < total {
            let frame = rx.recv().await.ok_or(ClientError::ConnectionLost)?;
            bytes.extend_from_slice(frame.body());
        }
        Ok(bytes)
    }

    /// Upload `bytes` under `name`. If the connection has dropped, this
    /// reconnects once and retries before giving up.
    pub async fn upload(self: &Arc<Self>, name: &str, bytes: &[u8]) -> ClientResult<()> {
        self.with_reconnect(|| self.upload_once(name, bytes)).await
    }

    async fn upload_once(&self, name: &str, bytes: &[u8]) -> ClientResult<()> {
        let seqn = self.next_seqn();
        let mut rx = self.routes.register(seqn).await;

        let mut frames = vec![Frame::new(FrameType::CmdUpload, seqn, bytes.len() as u32, name.as_bytes())];
        frames.extend(
            bytes
                .chunks(PAYLOAD_CAPACITY)
                .map(|chunk| Frame::single(FrameType::DataPacket, seqn, chunk)),
        );
        self.send_all(&frames).await?;

        let reply = self.await_header(&mut rx).await;
        self.routes.remove(seqn).await;
        let reply = reply?;
        if reply.body() == b"OK" {
            Ok(())
        } else {
            Err(ClientError::Server(reply.body_str().into_owned()))
        }
    }

    /// Download `name`'s full contents. If the connection has dropped,
    /// this reconnects once and retries before giving up.
    pub async fn download(self: &Arc<Self>, name: &str) -> ClientResult<Vec<u8>> {
        self.with_reconnect(|| self.download_once(name)).await
    }

    async fn download_once(&self, name: &str) -> ClientResult<Vec<u8>> {
        let seqn = self.next_seqn();
        let mut rx = self.routes.register(seqn).await;
        self.send_all(&[Frame::single(FrameType::CmdDownload, seqn, name.as_bytes())])
            .await?;

        let header = self.await_header(&mut rx).await;
        let result = match header {
            Ok(header) if header.body() == b"OK" => {
                self.drain_body(&mut rx, header.total_size as usize).await
            }
            Ok(header) if header.body() == b"NOT_FOUND" => Err(ClientError::NotFound),
            Ok(header) => Err(ClientError::Server(header.body_str().into_owned())),
            Err(err) => Err(err),
        };
        self.routes.remove(seqn).await;
        result
    }

    /// Delete `name` on the server. If the connection has dropped, this
    /// reconnects once and retries before giving up.
    pub async fn delete(self: &Arc<Self>, name: &str) -> ClientResult<()> {
        self.with_reconnect(|| self.delete_once(name)).await
    }

    async fn delete_once(&self, name: &str) -> ClientResult<()> {
        let seqn = self.next_seqn();
        let mut rx = self.routes.register(seqn).await;
        self.send_all(&[Frame::single(FrameType::CmdDelete, seqn, name.as_bytes())])
            .await?;

        let reply = self.await_header(&mut rx).await;
        self.routes.remove(seqn).await;
        match reply? {
            reply if reply.body() == b"OK" => Ok(()),
            reply if reply.body() == b"NOT_FOUND" => Err(ClientError::NotFound),
            reply => Err(ClientError::Server(reply.body_str().into_owned())),
        }
    }

    /// List every file the server has for this user. If the connection
    /// has dropped, this reconnects once and retries before giving up.
    pub async fn list(self: &Arc<Self>) -> ClientResult<Vec<RemoteFile>> {
        self.with_reconnect(|| self.list_once()).await
    }

    async fn list_once(&self) -> ClientResult<Vec<RemoteFile>> {
        let seqn = self.next_seqn();
        let mut rx = self.routes.register(seqn).await;
        self.send_all(&[Frame::single(FrameType::CmdListServer, seqn, &[])])
            .await?;

        let header = self.await_header(&mut rx).await;
        let result = async {
            let header = header?;
            let mut payload = header.body().to_vec();
            if (header.total_size as usize) > payload.len() {
                let rest = self
                    .drain_body(&mut rx, header.total_size as usize - payload.len())
                    .await?;
                payload.extend(rest);
            }
            Ok(parse_listing(&payload))
        }
        .await;
        self.routes.remove(seqn).await;
        result
    }

    /// Run `op` once; if it fails with an error that indicates the
    /// connection itself is gone, reconnect and run it exactly one more
    /// time. A second failure (including a failed reconnect) is returned
    /// to the caller as-is.
    async fn with_reconnect<F, Fut, T>(self: &Arc<Self>, op: F) -> ClientResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ClientResult<T>> + Send,
    {
        match op().await {
            Err(err) if is_connection_error(&err) => {
                tracing::warn!(error = %err, "command failed due to a dropped connection, reconnecting");
                self.reconnect().await?;
                op().await
            }
            other => other,
        }
    }

    /// Request the server's full set of files for this user, as
    /// `(filename, size)` pairs, without downloading any bytes yet.
    pub(crate) async fn get_sync_dir(&self) -> ClientResult<Vec<(String, u64)>> {
        let seqn = self.next_seqn();
        let mut rx = self.routes.register(seqn).await;
        self.send_all(&[Frame::single(FrameType::CmdGetSyncDir, seqn, &[])])
            .await?;

        let header = self.await_header(&mut rx).await;
        let result = async {
            let header = header?;
            let count = header.total_size as usize;
            let mut files = Vec::with_capacity(count);
            for _ in 0..count {
                let frame = rx.recv().await.ok_or(ClientError::ConnectionLost)?;
                let body = frame.body_str();
                if let Some(name) = body.strip_prefix("U:") {
                    files.push((name.to_string(), frame.total_size as u64));
                }
            }
            Ok(files)
        }
        .await;
        self.routes.remove(seqn).await;
        result
    }
}

/// Whether `err` indicates the transport itself is broken (as opposed to
/// a well-formed server response like `NOT_FOUND` or `ERROR`), and is
/// therefore worth reconnecting over before retrying.
fn is_connection_error(err: &ClientError) -> bool {
    match err {
        ClientError::ConnectionLost | ClientError::Io(_) => true,
        ClientError::Frame(FrameError::ConnectionLost | FrameError::FramingLost | FrameError::Io(_)) => true,
        ClientError::Frame(_) | ClientError::NotFound | ClientError::Server(_) => false,
    }
}

fn parse_listing(payload: &[u8]) -> Vec<RemoteFile> {
    String::from_utf8_lossy(payload)
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(5, ',');
            Some(RemoteFile {
                name: parts.next()?.to_string(),
                size: parts.next()?.parse().ok()?,
                mtime: parts.next()?.parse().ok()?,
                atime: parts.next()?.parse().ok()?,
                ctime: parts.next()?.parse().ok()?,
            })
        })
        .collect()
}

async fn raw_connect(
    server: SocketAddr,
    user: &Username,
) -> ClientResult<(tokio::net::tcp::OwnedReadHalf, tokio::net::tcp::OwnedWriteHalf)> {
    let stream = TcpStream::connect(server).await?;
    stream.set_nodelay(true).ok();
    let (mut read_half, mut write_half) = stream.into_split();

    send_frame(&mut write_half, &Frame::single(FrameType::CmdLogin, 0, user.as_str().as_bytes())).await?;
    let reply = recv_frame(&mut read_half).await?;
    match reply.frame_type {
        FrameType::CmdLogin => Ok((read_half, write_half)),
        FrameType::CmdExit => Err(ClientError::Server(reply.body_str().into_owned())),
        other => Err(ClientError::Frame(FrameError::ProtocolViolation(format!(
            "unexpected reply to login: {other:?}"
        )))),
    }
}
