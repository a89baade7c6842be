use std::collections::HashMap;
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use crate::error::ClientResult;

/// Write `bytes` to `path` atomically: write to a temp file in the same
/// directory, fsync it, then rename into place. A reader can never
/// observe a partially written file at `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> ClientResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// The file's modification time, in whole seconds, as surfaced to the
/// Watcher's change-detection snapshot.
pub(crate) fn mtime_of(path: &Path) -> ClientResult<i64> {
    Ok(std::fs::metadata(path)?.mtime())
}

/// Enumerate regular files directly inside `dir` and their mtimes.
/// Entries that are not regular files (subdirectories, sockets) are
/// skipped; the sync directory is intentionally flat.
pub(crate) fn snapshot_dir(dir: &Path) -> ClientResult<HashMap<String, i64>> {
    let mut snapshot = HashMap::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let mtime = entry.metadata()?.mtime();
        snapshot.insert(name, mtime);
    }
    Ok(snapshot)
}
