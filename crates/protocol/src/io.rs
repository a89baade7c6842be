use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{FrameError, FrameResult};
use crate::frame::{Frame, FRAME_LEN};

/// Write exactly one frame, retrying short writes until complete.
///
/// `AsyncWriteExt::write_all` already retries internally; this wrapper
/// exists so every call site goes through one place that turns I/O errors
/// into [`FrameError`] and keeps the "exactly one frame per call" contract
/// explicit, mirroring the header-then-payload `write_all` pairs in
/// `exchanges/sender/src/send_files/handler.rs`.
pub async fn send_frame<W>(writer: &mut W, frame: &Frame) -> FrameResult<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let bytes = frame.encode();
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read exactly one frame, or fail.
///
/// A zero-byte read at the start of a frame means the peer closed the
/// connection cleanly (`ConnectionLost`); a read that returns some but not
/// all of a frame's bytes before EOF means the stream desynchronized
/// (`FramingLost`) and the connection must be torn down.
pub async fn recv_frame<R>(reader: &mut R) -> FrameResult<Frame>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = [0u8; FRAME_LEN];
    let mut read = 0usize;
    while read < FRAME_LEN {
        let n = reader.read(&mut buf[read..]).await?;
        if n == 0 {
            return Err(if read == 0 {
                FrameError::ConnectionLost
            } else {
                FrameError::FramingLost
            });
        }
        read += n;
    }
    Frame::decode(&buf)
}

/// Read exactly one frame, failing with [`FrameError::Timeout`] if none
/// arrives within `timeout`. A timeout is recoverable: the connection is
/// still usable and the caller may retry.
pub async fn recv_frame_timeout<R>(reader: &mut R, timeout: Duration) -> FrameResult<Frame>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match tokio::time::timeout(timeout, recv_frame(reader)).await {
        Ok(result) => result,
        Err(_) => Err(FrameError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameType;
    use tokio::io::duplex;

    #[tokio::test]
    async fn send_then_recv_yields_identical_frame() {
        let (mut a, mut b) = duplex(FRAME_LEN * 2);
        let frame = Frame::single(FrameType::CmdUpload, 7, b"report.csv");
        send_frame(&mut a, &frame).await.unwrap();
        let got = recv_frame(&mut b).await.unwrap();
        assert_eq!(got.seqn, 7);
        assert_eq!(got.body(), b"report.csv");
    }

    #[tokio::test]
    async fn recv_on_closed_stream_is_connection_lost() {
        let (a, mut b) = duplex(FRAME_LEN);
        drop(a);
        let err = recv_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionLost));
    }

    #[tokio::test]
    async fn recv_on_truncated_stream_is_framing_lost() {
        let (mut a, mut b) = duplex(FRAME_LEN);
        a.write_all(&[0u8; 4]).await.unwrap();
        drop(a);
        let err = recv_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, FrameError::FramingLost));
    }

    #[tokio::test]
    async fn recv_without_data_times_out() {
        let (_a, mut b) = duplex(FRAME_LEN);
        let err = recv_frame_timeout(&mut b, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::Timeout));
    }

    #[tokio::test]
    async fn consecutive_frames_stay_aligned() {
        let (mut a, mut b) = duplex(FRAME_LEN * 4);
        let one = Frame::single(FrameType::DataPacket, 3, b"abc");
        let two = Frame::single(FrameType::DataPacket, 3, b"defg");
        send_frame(&mut a, &one).await.unwrap();
        send_frame(&mut a, &two).await.unwrap();
        let got_one = recv_frame(&mut b).await.unwrap();
        let got_two = recv_frame(&mut b).await.unwrap();
        assert_eq!(got_one.body(), b"abc");
        assert_eq!(got_two.body(), b"defg");
    }
}
