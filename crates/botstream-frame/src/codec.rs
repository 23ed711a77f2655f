use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use uuid::Uuid;

use crate::error::{FrameError, Result};
use crate::header::{Header, PayloadType, HEADER_SIZE, MAX_PAYLOAD_LENGTH};

/// Default maximum payload bytes per outgoing frame.
pub const DEFAULT_MAX_PAYLOAD: usize = 4096;

/// One header plus its payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame whose header length matches `payload`.
    pub fn new(payload_type: PayloadType, id: Uuid, end: bool, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            header: Header::new(payload_type, id, payload.len(), end),
            payload,
        }
    }

    /// A zero-length final frame, as used for cancellation.
    pub fn empty(payload_type: PayloadType, id: Uuid) -> Self {
        Self::new(payload_type, id, true, Bytes::new())
    }

    pub fn id(&self) -> Uuid {
        self.header.id
    }

    pub fn payload_type(&self) -> PayloadType {
        self.header.payload_type
    }

    pub fn is_end(&self) -> bool {
        self.header.end
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    if frame.header.payload_length != frame.payload.len() {
        return Err(FrameError::LengthMismatch {
            declared: frame.header.payload_length,
            actual: frame.payload.len(),
        });
    }
    dst.reserve(frame.wire_size());
    frame.header.serialize(dst)?;
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let header = Header::deserialize(&src[..HEADER_SIZE])?;

    if header.payload_length > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: header.payload_length,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + header.payload_length;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(header.payload_length).freeze();

    Ok(Some(Frame { header, payload }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload bytes per outgoing frame. Default: 4096.
    pub max_payload_size: usize,
    /// Largest payload accepted from the peer. Default: 999,999.
    pub max_inbound_payload: usize,
}

impl FrameConfig {
    /// Set the outgoing chunk size, clamped to what the header can express.
    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size.clamp(1, MAX_PAYLOAD_LENGTH);
        self
    }

    pub fn with_max_inbound_payload(mut self, size: usize) -> Self {
        self.max_inbound_payload = size.min(MAX_PAYLOAD_LENGTH);
        self
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            max_inbound_payload: MAX_PAYLOAD_LENGTH,
        }
    }
}

/// `tokio_util` codec over [`encode_frame`] / [`decode_frame`].
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_inbound_payload: usize,
}

impl FrameCodec {
    pub fn new(config: &FrameConfig) -> Self {
        Self {
            max_inbound_payload: config.max_inbound_payload,
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(&FrameConfig::default())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        decode_frame(src, self.max_inbound_payload)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.is_empty() {
            return Ok(None);
        }
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        encode_frame(&item, dst)
    }
}
