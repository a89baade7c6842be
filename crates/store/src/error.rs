use std::io;

/// Errors a store operation can surface.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested file does not exist in the user's directory.
    #[error("file not found")]
    NotFound,

    /// Underlying I/O error (permissions, disk full, etc).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
