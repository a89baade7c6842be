use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use driftsync_client::{Client, ClientConfig};
use driftsync_protocol::Username;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

async fn start_server() -> (std::net::SocketAddr, tempfile::TempDir) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let root = tempfile::tempdir().unwrap();
    let root_path = root.path().to_path_buf();
    tokio::spawn(async move {
        driftsync_server::serve_listener(listener, root_path, Duration::from_secs(30))
            .await
            .unwrap();
    });
    (addr, root)
}

/// A TCP relay sitting in front of `target` so a test can sever an
/// established client connection on demand (`kill`) without tearing down
/// the server itself.
struct Proxy {
    addr: SocketAddr,
    current: Arc<AsyncMutex<Option<JoinHandle<()>>>>,
}

async fn start_proxy(target: SocketAddr) -> Proxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let current = Arc::new(AsyncMutex::new(None));
    let current_for_loop = current.clone();

    tokio::spawn(async move {
        loop {
            let (inbound, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => break,
            };
            let handle = tokio::spawn(async move {
                if let Ok(mut outbound) = TcpStream::connect(target).await {
                    let mut inbound = inbound;
                    let _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await;
                }
            });
            *current_for_loop.lock().await = Some(handle);
        }
    });

    Proxy { addr, current }
}

impl Proxy {
    /// Abort the relay task for the current connection, closing both its
    /// inbound and outbound sockets as if the network had dropped.
    async fn kill(&self) {
        if let Some(handle) = self.current.lock().await.take() {
            handle.abort();
        }
    }
}

#[tokio::test]
async fn upload_list_download_delete_round_trip() {
    let (addr, _root) = start_server().await;
    let sync_dir = tempfile::tempdir().unwrap();

    let config = ClientConfig {
        server: addr,
        user: Username::parse("alice").unwrap(),
        sync_dir: sync_dir.path().to_path_buf(),
    };
    let client = Client::connect(config).await.unwrap();

    client.upload("notes.txt", b"hello world").await.unwrap();

    let listed = client.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "notes.txt");
    assert_eq!(listed[0].size, 11);

    let bytes = client.download("notes.txt").await.unwrap();
    assert_eq!(bytes, b"hello world");

    client.delete("notes.txt").await.unwrap();
    let err = client.download("notes.txt").await.unwrap_err();
    assert!(matches!(err, driftsync_client::ClientError::NotFound));
}

#[tokio::test]
async fn second_client_sees_first_clients_upload_via_notification() {
    let (addr, _root) = start_server().await;
    let dir1 = tempfile::tempdir().unwrap();
    let dir2 = tempfile::tempdir().unwrap();
    let user = Username::parse("shared").unwrap();

    let client1 = Client::connect(ClientConfig {
        server: addr,
        user: user.clone(),
        sync_dir: dir1.path().to_path_buf(),
    })
    .await
    .unwrap();
    let _client2 = Client::connect(ClientConfig {
        server: addr,
        user: user.clone(),
        sync_dir: dir2.path().to_path_buf(),
    })
    .await
    .unwrap();

    client1.upload("shared.txt", b"from client one").await.unwrap();

    let path2 = dir2.path().join("shared.txt");
    let mut seen = Vec::new();
    for _ in 0..50 {
        if let Ok(bytes) = tokio::fs::read(&path2).await {
            seen = bytes;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(seen, b"from client one");
}

#[tokio::test]
async fn watcher_uploads_a_file_dropped_into_the_sync_directory() {
    let (addr, _root) = start_server().await;
    let sync_dir = tempfile::tempdir().unwrap();

    let client = Client::connect(ClientConfig {
        server: addr,
        user: Username::parse("watched").unwrap(),
        sync_dir: sync_dir.path().to_path_buf(),
    })
    .await
    .unwrap();

    tokio::fs::write(sync_dir.path().join("dropped.txt"), b"picked up by the watcher")
        .await
        .unwrap();

    let mut found = false;
    for _ in 0..30 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        if let Ok(listed) = client.list().await {
            if listed.iter().any(|f| f.name == "dropped.txt") {
                found = true;
                break;
            }
        }
    }
    assert!(found, "watcher did not upload the dropped file in time");
}

#[tokio::test]
async fn sibling_delete_removes_local_copy_without_client_deleting_itself() {
    let (addr, _root) = start_server().await;
    let dir1 = tempfile::tempdir().unwrap();
    let dir2 = tempfile::tempdir().unwrap();
    let user = Username::parse("s3scenario").unwrap();

    let client1 = Client::connect(ClientConfig {
        server: addr,
        user: user.clone(),
        sync_dir: dir1.path().to_path_buf(),
    })
    .await
    .unwrap();
    let client2 = Client::connect(ClientConfig {
        server: addr,
        user: user.clone(),
        sync_dir: dir2.path().to_path_buf(),
    })
    .await
    .unwrap();

    client1.upload("ephemeral.txt", b"will be deleted").await.unwrap();
    let path2 = dir2.path().join("ephemeral.txt");
    for _ in 0..50 {
        if tokio::fs::metadata(&path2).await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(
        tokio::fs::metadata(&path2).await.is_ok(),
        "notification did not install the file on client2 in time"
    );

    client1.delete("ephemeral.txt").await.unwrap();

    let mut removed = false;
    for _ in 0..50 {
        if tokio::fs::metadata(&path2).await.is_err() {
            removed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(
        removed,
        "client2's local copy was not removed by the delete notification"
    );

    // Give client2's watcher several ticks to notice the local absence. It
    // must not treat the disappearance as a local deletion to propagate
    // (the file is already gone server-side) nor re-upload anything.
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let still_listed = client2
        .list()
        .await
        .unwrap()
        .iter()
        .any(|f| f.name == "ephemeral.txt");
    assert!(
        !still_listed,
        "watcher re-uploaded a file that was removed via a delete notification"
    );
}

#[tokio::test]
async fn watcher_does_not_reupload_a_notification_installed_file() {
    let (addr, _root) = start_server().await;
    let dir1 = tempfile::tempdir().unwrap();
    let dir2 = tempfile::tempdir().unwrap();
    let user = Username::parse("fixedpoint").unwrap();

    let client1 = Client::connect(ClientConfig {
        server: addr,
        user: user.clone(),
        sync_dir: dir1.path().to_path_buf(),
    })
    .await
    .unwrap();
    let client2 = Client::connect(ClientConfig {
        server: addr,
        user: user.clone(),
        sync_dir: dir2.path().to_path_buf(),
    })
    .await
    .unwrap();

    client1.upload("steady.txt", b"installed by notification").await.unwrap();

    let path2 = dir2.path().join("steady.txt");
    for _ in 0..50 {
        if tokio::fs::metadata(&path2).await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(
        tokio::fs::metadata(&path2).await.is_ok(),
        "notification did not install the file on client2 in time"
    );

    let mtime_after_install = client2
        .list()
        .await
        .unwrap()
        .into_iter()
        .find(|f| f.name == "steady.txt")
        .expect("steady.txt should be listed right after install")
        .mtime;

    // Give the watcher several ticks to (incorrectly) notice the file and
    // re-upload it; a re-upload would rewrite the server-side file and
    // bump its mtime.
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let mtime_after_ticks = client2
        .list()
        .await
        .unwrap()
        .into_iter()
        .find(|f| f.name == "steady.txt")
        .expect("steady.txt should still be listed")
        .mtime;

    assert_eq!(
        mtime_after_install, mtime_after_ticks,
        "watcher re-uploaded a file the notification handler had just installed"
    );
}

#[tokio::test]
async fn upload_after_connection_drop_reconnects_and_succeeds() {
    let (real_addr, _root) = start_server().await;
    let proxy = start_proxy(real_addr).await;
    let sync_dir = tempfile::tempdir().unwrap();

    let client = Client::connect(ClientConfig {
        server: proxy.addr,
        user: Username::parse("reconnector").unwrap(),
        sync_dir: sync_dir.path().to_path_buf(),
    })
    .await
    .unwrap();

    client.upload("before.txt", b"ok").await.unwrap();
    assert!(client.is_alive());

    proxy.kill().await;

    let mut noticed = false;
    for _ in 0..50 {
        if !client.is_alive() {
            noticed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(noticed, "client never noticed the connection was severed");

    // The next command should transparently reconnect through a fresh
    // proxied connection and succeed.
    client.upload("after.txt", b"still works").await.unwrap();
    assert!(client.is_alive());

    let listed = client.list().await.unwrap();
    let names: Vec<&str> = listed.iter().map(|f| f.name.as_str()).collect();
    assert!(names.contains(&"before.txt"));
    assert!(names.contains(&"after.txt"));
}
