/// Errors a session worker can encounter while serving one connection.
///
/// Every variant here is terminal for the connection: on any of them the
/// worker closes the socket and unregisters its session. Errors that are
/// locally recoverable (a missing file, a failed write) are reported to
/// the peer as an `"ERROR"`/`"NOT_FOUND"` payload instead of surfacing
/// here.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session limit for this user was already reached.
    #[error("admission denied: session limit reached for this user")]
    AdmissionDenied,

    #[error(transparent)]
    Frame(#[from] driftsync_protocol::FrameError),

    #[error(transparent)]
    Store(#[from] driftsync_store::StoreError),
}

pub type SessionResult<T> = Result<T, SessionError>;
