use std::fmt;

use bytes::{BufMut, BytesMut};
use uuid::Uuid;

use crate::error::{FrameError, Result};

/// Size of the fixed ASCII header preceding every payload.
pub const HEADER_SIZE: usize = 48;

/// Largest value the six-digit length field can carry.
pub const MAX_PAYLOAD_LENGTH: usize = 999_999;

const DELIMITER: u8 = b'.';
const TERMINATOR: u8 = b'\n';
const END: u8 = b'1';
const NOT_END: u8 = b'0';

const TYPE_OFFSET: usize = 0;
const TYPE_DELIMITER_OFFSET: usize = 1;
const LENGTH_OFFSET: usize = 2;
const LENGTH_LEN: usize = 6;
const LENGTH_DELIMITER_OFFSET: usize = 8;
const ID_OFFSET: usize = 9;
const ID_LEN: usize = 36;
const ID_DELIMITER_OFFSET: usize = 45;
const END_OFFSET: usize = 46;
const TERMINATOR_OFFSET: usize = 47;

/// Kind of payload a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    /// Structured request body (`'A'`).
    Request,
    /// Structured response body (`'B'`).
    Response,
    /// Raw content stream chunk (`'S'`).
    Stream,
    /// Cancel every stream of a message (`'X'`).
    CancelAll,
    /// Cancel a single stream (`'C'`).
    CancelStream,
}

impl PayloadType {
    /// The type character written at offset 0 of the header.
    pub const fn as_byte(self) -> u8 {
        match self {
            PayloadType::Request => b'A',
            PayloadType::Response => b'B',
            PayloadType::Stream => b'S',
            PayloadType::CancelAll => b'X',
            PayloadType::CancelStream => b'C',
        }
    }

    /// Request and response bodies are reassembled as JSON messages.
    pub const fn is_structured(self) -> bool {
        matches!(self, PayloadType::Request | PayloadType::Response)
    }

    /// Cancel frames carry no payload and target outgoing work.
    pub const fn is_cancel(self) -> bool {
        matches!(self, PayloadType::CancelAll | PayloadType::CancelStream)
    }

    pub const fn name(self) -> &'static str {
        match self {
            PayloadType::Request => "request",
            PayloadType::Response => "response",
            PayloadType::Stream => "stream",
            PayloadType::CancelAll => "cancel-all",
            PayloadType::CancelStream => "cancel-stream",
        }
    }
}

impl TryFrom<u8> for PayloadType {
    type Error = FrameError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            b'A' => Ok(PayloadType::Request),
            b'B' => Ok(PayloadType::Response),
            b'S' => Ok(PayloadType::Stream),
            b'X' => Ok(PayloadType::CancelAll),
            b'C' => Ok(PayloadType::CancelStream),
            other => Err(FrameError::InvalidType(other)),
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded frame header.
///
/// Wire layout (48 ASCII bytes):
/// ```text
/// ┌──────┬───┬──────────┬───┬──────────────────────────────────────┬───┬─────┬────┐
/// │ Type │ . │ Length   │ . │ Id (hyphenated UUID)                 │ . │ End │ \n │
/// │ 1B   │   │ 6 digits │   │ 36B                                  │   │ 0|1 │    │
/// └──────┴───┴──────────┴───┴──────────────────────────────────────┴───┴─────┴────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub payload_type: PayloadType,
    pub payload_length: usize,
    pub id: Uuid,
    pub end: bool,
}

impl Header {
    pub fn new(payload_type: PayloadType, id: Uuid, payload_length: usize, end: bool) -> Self {
        Self {
            payload_type,
            payload_length,
            id,
            end,
        }
    }

    /// Append the 48-byte encoding of this header to `dst`.
    pub fn serialize(&self, dst: &mut BytesMut) -> Result<()> {
        if self.payload_length > MAX_PAYLOAD_LENGTH {
            return Err(FrameError::PayloadTooLarge {
                size: self.payload_length,
                max: MAX_PAYLOAD_LENGTH,
            });
        }

        let mut digits = [b'0'; LENGTH_LEN];
        let mut remaining = self.payload_length;
        for slot in digits.iter_mut().rev() {
            *slot = b'0' + (remaining % 10) as u8;
            remaining /= 10;
        }

        let mut id_buf = Uuid::encode_buffer();
        let id_text = self.id.hyphenated().encode_lower(&mut id_buf);

        dst.reserve(HEADER_SIZE);
        dst.put_u8(self.payload_type.as_byte());
        dst.put_u8(DELIMITER);
        dst.put_slice(&digits);
        dst.put_u8(DELIMITER);
        dst.put_slice(id_text.as_bytes());
        dst.put_u8(DELIMITER);
        dst.put_u8(if self.end { END } else { NOT_END });
        dst.put_u8(TERMINATOR);
        Ok(())
    }

    /// Encode into a standalone 48-byte array.
    pub fn to_bytes(&self) -> Result<[u8; HEADER_SIZE]> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        self.serialize(&mut buf)?;
        let mut out = [0u8; HEADER_SIZE];
        out.copy_from_slice(&buf);
        Ok(out)
    }

    /// Parse exactly [`HEADER_SIZE`] bytes.
    ///
    /// Any deviation in a fixed byte or field is a framing error; the caller
    /// must treat the connection as unrecoverable.
    pub fn deserialize(src: &[u8]) -> Result<Self> {
        if src.len() != HEADER_SIZE {
            return Err(FrameError::HeaderSize {
                expected: HEADER_SIZE,
                actual: src.len(),
            });
        }

        for offset in [
            TYPE_DELIMITER_OFFSET,
            LENGTH_DELIMITER_OFFSET,
            ID_DELIMITER_OFFSET,
        ] {
            if src[offset] != DELIMITER {
                return Err(FrameError::InvalidDelimiter {
                    offset,
                    found: src[offset],
                });
            }
        }
        if src[TERMINATOR_OFFSET] != TERMINATOR {
            return Err(FrameError::InvalidTerminator(src[TERMINATOR_OFFSET]));
        }

        let payload_type = PayloadType::try_from(src[TYPE_OFFSET])?;

        let length_field = &src[LENGTH_OFFSET..LENGTH_OFFSET + LENGTH_LEN];
        let mut payload_length = 0usize;
        for &byte in length_field {
            if !byte.is_ascii_digit() {
                return Err(FrameError::InvalidLength(
                    String::from_utf8_lossy(length_field).into_owned(),
                ));
            }
            payload_length = payload_length * 10 + usize::from(byte - b'0');
        }

        let id_field = &src[ID_OFFSET..ID_OFFSET + ID_LEN];
        let id = Uuid::try_parse_ascii(id_field)
            .map_err(|_| FrameError::InvalidId(String::from_utf8_lossy(id_field).into_owned()))?;

        let end = match src[END_OFFSET] {
            END => true,
            NOT_END => false,
            other => return Err(FrameError::InvalidEnd(other)),
        };

        Ok(Self {
            payload_type,
            payload_length,
            id,
            end,
        })
    }
}
