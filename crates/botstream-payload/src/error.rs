use botstream_frame::{FrameError, PayloadType};
use uuid::Uuid;

/// Errors that can occur while assembling or disassembling payloads.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// Frame-level failure while writing.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A structured body could not be serialized or parsed.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A correlation id was registered while already pending.
    #[error("correlation id {0} is already registered")]
    DuplicateRegistration(Uuid),

    /// A frame's type disagrees with the payload already in progress for its id.
    #[error("{found} frame for in-progress {expected} payload {id}")]
    TypeMismatch {
        id: Uuid,
        expected: PayloadType,
        found: PayloadType,
    },

    /// Buffered-but-unread bytes would exceed the configured limit.
    #[error("stream buffer limit exceeded ({buffered} bytes buffered, limit {limit})")]
    BufferOverflow { buffered: usize, limit: usize },

    /// Reading an outgoing stream source or a content stream failed.
    #[error("payload I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PayloadError>;
