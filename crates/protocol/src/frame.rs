use crate::error::FrameError;

/// Bytes available in a frame's body.
pub const PAYLOAD_CAPACITY: usize = 1024;

/// Size in bytes of the fixed header: `type`(2) + `seqn`(2) + `total_size`(4)
/// + `length`(2).
pub const HEADER_LEN: usize = 2 + 2 + 4 + 2;

/// Size in bytes of a complete frame on the wire.
pub const FRAME_LEN: usize = HEADER_LEN + PAYLOAD_CAPACITY;

/// The kind of a frame, carried in its 16-bit `type` field.
///
/// Numeric values are part of the wire protocol and must not be renumbered;
/// they are wire-compatible with `original_source/common/packet.h`'s
/// `CMD_*`/`DATA_PACKET`/`SYNC_NOTIFICATION` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FrameType {
    CmdLogin = 1,
    CmdUpload = 2,
    CmdDownload = 3,
    CmdDelete = 4,
    CmdListServer = 5,
    CmdListClient = 6,
    CmdGetSyncDir = 7,
    DataPacket = 8,
    SyncNotification = 9,
    CmdExit = 10,
}

impl FrameType {
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for FrameType {
    type Error = FrameError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => FrameType::CmdLogin,
            2 => FrameType::CmdUpload,
            3 => FrameType::CmdDownload,
            4 => FrameType::CmdDelete,
            5 => FrameType::CmdListServer,
            6 => FrameType::CmdListClient,
            7 => FrameType::CmdGetSyncDir,
            8 => FrameType::DataPacket,
            9 => FrameType::SyncNotification,
            10 => FrameType::CmdExit,
            other => {
                return Err(FrameError::ProtocolViolation(format!(
                    "unknown frame type {other}"
                )))
            }
        })
    }
}

/// One fixed-size frame: the unit of transport.
///
/// `payload` always holds `PAYLOAD_CAPACITY` bytes; only the first `length`
/// of them are meaningful. Senders zero the remainder; receivers must never
/// read past `length`.
#[derive(Clone)]
pub struct Frame {
    pub frame_type: FrameType,
    pub seqn: u16,
    pub total_size: u32,
    pub length: u16,
    pub payload: [u8; PAYLOAD_CAPACITY],
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("frame_type", &self.frame_type)
            .field("seqn", &self.seqn)
            .field("total_size", &self.total_size)
            .field("length", &self.length)
            .finish()
    }
}

impl Frame {
    /// Build a frame from a byte slice that must fit within one payload.
    ///
    /// Panics if `bytes.len() > PAYLOAD_CAPACITY`; callers that may exceed a
    /// single frame's capacity (bulk bodies) must split into `DATA_PACKET`
    /// frames themselves — see `driftsync-server`/`driftsync-client`'s body
    /// streaming helpers.
    pub fn new(frame_type: FrameType, seqn: u16, total_size: u32, bytes: &[u8]) -> Self {
        assert!(
            bytes.len() <= PAYLOAD_CAPACITY,
            "payload of {} bytes exceeds frame capacity of {PAYLOAD_CAPACITY}",
            bytes.len()
        );
        let mut payload = [0u8; PAYLOAD_CAPACITY];
        payload[..bytes.len()].copy_from_slice(bytes);
        Self {
            frame_type,
            seqn,
            total_size,
            length: bytes.len() as u16,
            payload,
        }
    }

    /// Build a frame whose `total_size` equals its own payload length — the
    /// common case for single-frame command/response headers with no bulk
    /// body to follow.
    pub fn single(frame_type: FrameType, seqn: u16, bytes: &[u8]) -> Self {
        Self::new(frame_type, seqn, bytes.len() as u32, bytes)
    }

    /// The meaningful slice of `payload`, bounded by `length`.
    pub fn body(&self) -> &[u8] {
        &self.payload[..self.length as usize]
    }

    /// The meaningful payload interpreted as UTF-8, lossily.
    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.body())
    }

    /// Encode this frame into its fixed 1034-byte little-endian wire form.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut out = [0u8; FRAME_LEN];
        out[0..2].copy_from_slice(&self.frame_type.as_u16().to_le_bytes());
        out[2..4].copy_from_slice(&self.seqn.to_le_bytes());
        out[4..8].copy_from_slice(&self.total_size.to_le_bytes());
        out[8..10].copy_from_slice(&self.length.to_le_bytes());
        out[HEADER_LEN..].copy_from_slice(&self.payload);
        out
    }

    /// Decode a frame from exactly `FRAME_LEN` bytes previously produced by
    /// [`Frame::encode`] (or a wire-compatible peer).
    pub fn decode(bytes: &[u8; FRAME_LEN]) -> Result<Self, FrameError> {
        let frame_type = u16::from_le_bytes([bytes[0], bytes[1]]).try_into()?;
        let seqn = u16::from_le_bytes([bytes[2], bytes[3]]);
        let total_size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let length = u16::from_le_bytes([bytes[8], bytes[9]]);
        if length as usize > PAYLOAD_CAPACITY {
            return Err(FrameError::ProtocolViolation(format!(
                "length {length} exceeds payload capacity {PAYLOAD_CAPACITY}"
            )));
        }
        let mut payload = [0u8; PAYLOAD_CAPACITY];
        payload.copy_from_slice(&bytes[HEADER_LEN..]);
        Ok(Self {
            frame_type,
            seqn,
            total_size,
            length,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_wire_encoding() {
        let frame = Frame::single(FrameType::CmdLogin, 42, b"alice");
        let encoded = frame.encode();
        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded.frame_type, FrameType::CmdLogin);
        assert_eq!(decoded.seqn, 42);
        assert_eq!(decoded.body(), b"alice");
        assert_eq!(decoded.total_size, 5);
    }

    #[test]
    fn zero_pads_unused_payload_bytes() {
        let frame = Frame::single(FrameType::CmdDelete, 1, b"hi");
        assert!(frame.payload[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn rejects_unknown_frame_type_on_decode() {
        let mut bytes = Frame::single(FrameType::CmdLogin, 0, b"x").encode();
        bytes[0..2].copy_from_slice(&99u16.to_le_bytes());
        let err = Frame::decode(&bytes).unwrap_err();
        assert!(matches!(err, FrameError::ProtocolViolation(_)));
    }

    #[test]
    fn rejects_length_exceeding_capacity() {
        let mut bytes = Frame::single(FrameType::CmdLogin, 0, b"x").encode();
        bytes[8..10].copy_from_slice(&2000u16.to_le_bytes());
        let err = Frame::decode(&bytes).unwrap_err();
        assert!(matches!(err, FrameError::ProtocolViolation(_)));
    }

    #[test]
    #[should_panic]
    fn new_panics_on_oversized_payload() {
        let big = vec![0u8; PAYLOAD_CAPACITY + 1];
        Frame::new(FrameType::DataPacket, 0, 0, &big);
    }
}
