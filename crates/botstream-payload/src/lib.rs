//! Payload layer: turns frames into streams and messages, and back.
//!
//! Incoming frames are demultiplexed by correlation id:
//! - `Stream` frames land in a [`StreamRegistry`] which hands out readable
//!   [`ContentStream`] handles backed by a [`ChunkBuffer`].
//! - `Request` / `Response` frames are reassembled by a [`MessageAssembler`]
//!   and delivered to a [`PayloadHandler`] once complete.
//!
//! Outgoing requests and responses are fragmented by a [`Disassembler`],
//! and request/response pairs are matched through a [`RequestManager`].

pub mod assembler;
pub mod buffer;
pub mod disassembler;
pub mod error;
pub mod models;
pub mod registry;
pub mod request_manager;
pub mod stream;

pub use assembler::{MessageAssembler, PayloadHandler};
pub use buffer::ChunkBuffer;
pub use disassembler::{disassemble_bytes, Disassembler};
pub use error::{PayloadError, Result};
pub use models::{
    verb, OutgoingStream, ReceiveRequest, ReceiveResponse, RequestPayload, ResponsePayload,
    StreamContent, StreamDescription, StreamingRequest, StreamingResponse,
};
pub use registry::{StreamAssembler, StreamCancelHandler, StreamRegistry, StreamRegistryBuilder};
pub use request_manager::{PendingResponse, RequestManager, ResponseOutcome};
pub use stream::ContentStream;
