/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A header must be exactly 48 bytes.
    #[error("header must be {expected} bytes, got {actual}")]
    HeaderSize { expected: usize, actual: usize },

    /// The type byte is not one of the known payload types.
    #[error("unknown payload type {0:#04x}")]
    InvalidType(u8),

    /// A fixed delimiter byte is wrong.
    #[error("invalid delimiter {found:#04x} at offset {offset}")]
    InvalidDelimiter { offset: usize, found: u8 },

    /// The payload length field is not a six-digit decimal.
    #[error("invalid payload length field {0:?}")]
    InvalidLength(String),

    /// The id field is not a hyphenated UUID.
    #[error("invalid correlation id {0:?}")]
    InvalidId(String),

    /// The end flag is neither '0' nor '1'.
    #[error("invalid end marker {0:#04x}")]
    InvalidEnd(u8),

    /// The header terminator is not '\n'.
    #[error("invalid header terminator {0:#04x}")]
    InvalidTerminator(u8),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The header's declared length disagrees with the attached payload.
    #[error("header declares {declared} payload bytes but frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// True for malformed-header errors.
    ///
    /// These are fatal to the connection: the byte stream can no longer be
    /// trusted to be aligned on frame boundaries.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            FrameError::HeaderSize { .. }
                | FrameError::InvalidType(_)
                | FrameError::InvalidDelimiter { .. }
                | FrameError::InvalidLength(_)
                | FrameError::InvalidId(_)
                | FrameError::InvalidEnd(_)
                | FrameError::InvalidTerminator(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
