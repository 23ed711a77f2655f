//! Fixed-header message framing with correlation-id multiplexing.
//!
//! Every frame on the wire is a 48-byte ASCII header followed by exactly
//! `payload_length` raw bytes. The header carries:
//! - a one-character payload type (request, response, stream, cancel)
//! - a zero-padded six-digit payload length
//! - the 128-bit correlation id (hyphenated UUID text)
//! - an end flag marking the final frame of a logical payload
//!
//! All frames of one logical payload share an id, so frames of many
//! exchanges can be interleaved on one connection and pulled apart again
//! by the receiver.

pub mod codec;
pub mod error;
pub mod header;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameCodec, FrameConfig, DEFAULT_MAX_PAYLOAD,
};
pub use error::{FrameError, Result};
pub use header::{Header, PayloadType, HEADER_SIZE, MAX_PAYLOAD_LENGTH};
pub use reader::FrameReader;
pub use writer::FrameWriter;
