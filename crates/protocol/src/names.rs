use std::fmt;

use crate::error::FrameError;

/// A validated account name: non-empty, no `/`, no NUL byte.
///
/// Usernames travel as the body of `CMD_LOGIN` frames and double as the
/// directory name under the server's storage root, so the same validation
/// that keeps them wire-safe also keeps them filesystem-safe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Username(String);

impl Username {
    pub fn parse(raw: impl Into<String>) -> Result<Self, FrameError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(FrameError::ProtocolViolation("username is empty".into()));
        }
        if raw.contains('/') || raw.contains('\0') {
            return Err(FrameError::ProtocolViolation(format!(
                "username {raw:?} contains a path separator or NUL byte"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated flat file name: a basename with no path separators, no `.`
/// or `..`, no NUL byte, never empty.
///
/// Every command that names a file (`CMD_UPLOAD`, `CMD_DOWNLOAD`,
/// `CMD_DELETE`, the `U:`/`D:` notification prefixes) carries one of these
/// rather than a raw path, so a malicious or buggy peer can never make the
/// store walk outside a user's directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileName(String);

impl FileName {
    pub fn parse(raw: impl Into<String>) -> Result<Self, FrameError> {
        let raw = raw.into();
        if raw.is_empty() || raw == "." || raw == ".." {
            return Err(FrameError::ProtocolViolation(format!(
                "{raw:?} is not a valid file name"
            )));
        }
        if raw.contains('/') || raw.contains('\\') || raw.contains('\0') {
            return Err(FrameError::ProtocolViolation(format!(
                "file name {raw:?} contains a path separator or NUL byte"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Metadata for one stored file, as surfaced by `CMD_LIST_SERVER` and used
/// by the client watcher to decide whether a local file has changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub name: FileName,
    pub size: u64,
    pub mtime: i64,
    pub atime: i64,
    pub ctime: i64,
}
