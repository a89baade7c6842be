/// Errors a client operation can surface.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Frame(#[from] driftsync_protocol::FrameError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server responded `NOT_FOUND` to a download or delete.
    #[error("file not found on server")]
    NotFound,

    /// The server closed the connection with `CMD_EXIT` and a reason, most
    /// often login rejection because the session cap was reached.
    #[error("server closed the connection: {0}")]
    Server(String),

    /// The connection dropped while a command was in flight.
    #[error("connection lost")]
    ConnectionLost,
}

pub type ClientResult<T> = Result<T, ClientError>;
