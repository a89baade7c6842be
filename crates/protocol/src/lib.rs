//! Framed transport for driftsync: the fixed-size wire frame, the frame
//! types it carries, the I/O helpers that move one frame at a time across
//! an async stream, and the validated name types shared by every layer
//! above this one.

mod error;
mod frame;
mod io;
mod names;

pub use error::{FrameError, FrameResult};
pub use frame::{Frame, FrameType, FRAME_LEN, HEADER_LEN, PAYLOAD_CAPACITY};
pub use io::{recv_frame, recv_frame_timeout, send_frame};
pub use names::{FileMeta, FileName, Username};
