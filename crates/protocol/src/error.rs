use std::io;

/// Errors the framed transport can surface to its caller.
///
/// `ConnectionLost` and `FramingLost` are terminal for the connection;
/// `Timeout` is recoverable and leaves the connection usable.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The peer closed the connection (a clean, zero-byte read at a frame
    /// boundary).
    #[error("connection closed by peer")]
    ConnectionLost,

    /// A read returned fewer bytes than a full frame and no more bytes
    /// followed; the stream can no longer be trusted to be frame-aligned.
    #[error("frame read/write was split or truncated")]
    FramingLost,

    /// The frame decoded but violates the protocol: an unknown `type`, a
    /// `length` greater than the payload capacity, or a `DATA_PACKET` frame
    /// with no prior header.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The read did not complete within the caller's configured timeout.
    /// Unlike the other variants this is not terminal for the connection.
    #[error("read timed out")]
    Timeout,

    /// Underlying I/O error from the socket.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type FrameResult<T> = Result<T, FrameError>;
