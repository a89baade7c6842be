use std::collections::HashMap;
use std::fs::{self, File};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use driftsync_protocol::{FileMeta, FileName, Username};
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};

/// Per-user flat file storage rooted under one directory per account.
///
/// All operations for a given user are serialized by a per-user
/// `tokio::sync::Mutex`; the store itself knows nothing about sessions or
/// who is asking.
pub struct Store {
    root: PathBuf,
    locks: Mutex<HashMap<Username, Arc<Mutex<()>>>>,
}

impl Store {
    /// Create a store rooted at `root`. Does not touch the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// `<root>/files/sync_dir_<username>`, the persistent on-disk layout
    /// this store's files live under.
    fn user_dir(&self, user: &Username) -> PathBuf {
        self.root.join("files").join(format!("sync_dir_{}", user.as_str()))
    }

    async fn lock_for(&self, user: &Username) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(user.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Ensure the per-user directory exists. Idempotent: safe to call
    /// concurrently from two sessions logging in for the same user.
    pub async fn init_user(&self, user: &Username) -> StoreResult<()> {
        let lock = self.lock_for(user).await;
        let _guard = lock.lock().await;
        fs::create_dir_all(self.user_dir(user))?;
        Ok(())
    }

    /// Write `bytes` under `name`, then fsync the file and its parent
    /// directory so a subsequent `list` is guaranteed to see the new size
    /// and the new directory entry.
    pub async fn save(&self, user: &Username, name: &FileName, bytes: &[u8]) -> StoreResult<()> {
        let lock = self.lock_for(user).await;
        let _guard = lock.lock().await;
        let dir = self.user_dir(user);
        fs::create_dir_all(&dir)?;
        let path = dir.join(name.as_str());

        let file = File::create(&path)?;
        {
            use std::io::Write;
            let mut file = &file;
            file.write_all(bytes)?;
        }
        file.sync_all()?;
        fsync_dir(&dir)?;

        tracing::debug!(user = %user, file = %name, bytes = bytes.len(), "saved file");
        Ok(())
    }

    /// Read the full contents of `name`, failing with `NotFound` if it
    /// does not exist.
    pub async fn read(&self, user: &Username, name: &FileName) -> StoreResult<Vec<u8>> {
        let lock = self.lock_for(user).await;
        let _guard = lock.lock().await;
        let path = self.user_dir(user).join(name.as_str());
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    /// Remove `name`, failing with `NotFound` if it does not exist.
    pub async fn delete(&self, user: &Username, name: &FileName) -> StoreResult<()> {
        let lock = self.lock_for(user).await;
        let _guard = lock.lock().await;
        let dir = self.user_dir(user);
        let path = dir.join(name.as_str());
        match fs::remove_file(&path) {
            Ok(()) => {
                fsync_dir(&dir)?;
                tracing::debug!(user = %user, file = %name, "deleted file");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    /// List every file in the user's directory with its size and
    /// mtime/atime/ctime, refreshing the directory view first so a save
    /// or delete that just completed is reflected.
    pub async fn list(&self, user: &Username) -> StoreResult<Vec<FileMeta>> {
        let lock = self.lock_for(user).await;
        let _guard = lock.lock().await;
        let dir = self.user_dir(user);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        fsync_dir(&dir)?;

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            let name = match FileName::parse(name) {
                Ok(name) => name,
                Err(_) => continue,
            };
            let metadata = entry.metadata()?;
            entries.push(FileMeta {
                name,
                size: metadata.size(),
                mtime: metadata.mtime(),
                atime: metadata.atime(),
                ctime: metadata.ctime(),
            });
        }
        Ok(entries)
    }
}

fn fsync_dir(dir: &Path) -> StoreResult<()> {
    let handle = File::open(dir)?;
    handle.sync_all()?;
    Ok(())
}
