use std::sync::Arc;

use bytes::Bytes;
use botstream_frame::{Header, PayloadType};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::buffer::ChunkBuffer;
use crate::error::{PayloadError, Result};
use crate::models::{ReceiveRequest, ReceiveResponse, RequestPayload, ResponsePayload};
use crate::registry::StreamRegistry;

/// Receives structured payloads once their final frame has arrived.
pub trait PayloadHandler: Send + Sync {
    fn on_request_complete(&self, id: Uuid, request: ReceiveRequest);
    fn on_response_complete(&self, id: Uuid, response: ReceiveResponse);
}

struct StructuredAssembler {
    payload_type: PayloadType,
    body: ChunkBuffer,
}

/// Reassembles multi-frame requests and responses, keyed by correlation id.
///
/// Streams referenced by a completed payload are resolved against the
/// [`StreamRegistry`]; their bytes arrive separately as `Stream` frames.
pub struct MessageAssembler {
    in_progress: DashMap<Uuid, StructuredAssembler>,
    streams: StreamRegistry,
    handler: Arc<dyn PayloadHandler>,
}

impl MessageAssembler {
    pub fn new(streams: StreamRegistry, handler: Arc<dyn PayloadHandler>) -> Self {
        Self {
            in_progress: DashMap::new(),
            streams,
            handler,
        }
    }

    pub fn streams(&self) -> &StreamRegistry {
        &self.streams
    }

    /// Route one `Request` or `Response` frame.
    ///
    /// On the final frame the body is parsed and handed to the
    /// [`PayloadHandler`]. A frame whose type conflicts with the payload in
    /// progress for its id is rejected and leaves that payload untouched. A
    /// body that outgrows the registry's buffer limit is discarded.
    pub fn on_receive(&self, header: &Header, payload: Bytes) -> Result<()> {
        if !header.payload_type.is_structured() {
            debug!(kind = %header.payload_type, id = %header.id, "not a structured frame");
            return Ok(());
        }

        let written = {
            let entry = self
                .in_progress
                .entry(header.id)
                .or_insert_with(|| StructuredAssembler {
                    payload_type: header.payload_type,
                    body: ChunkBuffer::with_limit(self.streams.buffer_limit()),
                });
            if entry.payload_type != header.payload_type {
                return Err(PayloadError::TypeMismatch {
                    id: header.id,
                    expected: entry.payload_type,
                    found: header.payload_type,
                });
            }
            entry.body.write(payload)
        };
        if let Err(err) = written {
            debug!(id = %header.id, error = %err, "discarding oversized payload");
            self.in_progress.remove(&header.id);
            return Err(err);
        }

        if !header.end {
            return Ok(());
        }
        let Some((_, assembler)) = self.in_progress.remove(&header.id) else {
            return Ok(());
        };
        let body = assembler.body.take_all();
        self.complete(header.id, assembler.payload_type, &body)
    }

    fn complete(&self, id: Uuid, payload_type: PayloadType, body: &[u8]) -> Result<()> {
        match payload_type {
            PayloadType::Request => {
                let payload: RequestPayload = serde_json::from_slice(body)?;
                debug!(%id, verb = %payload.verb, path = %payload.path, "request assembled");
                let streams = payload
                    .streams
                    .iter()
                    .map(|description| self.streams.get_stream(description))
                    .collect();
                self.handler.on_request_complete(
                    id,
                    ReceiveRequest {
                        verb: payload.verb,
                        path: payload.path,
                        streams,
                    },
                );
            }
            PayloadType::Response => {
                let payload: ResponsePayload = serde_json::from_slice(body)?;
                debug!(%id, status = payload.status_code, "response assembled");
                let streams = payload
                    .streams
                    .iter()
                    .map(|description| self.streams.get_stream(description))
                    .collect();
                self.handler.on_response_complete(
                    id,
                    ReceiveResponse {
                        status_code: payload.status_code,
                        streams,
                    },
                );
            }
            _ => {}
        }
        Ok(())
    }

    /// Discard every partially assembled payload.
    pub fn cancel_all(&self) {
        self.in_progress.clear();
    }

    /// Number of payloads still waiting for their final frame.
    pub fn pending_count(&self) -> usize {
        self.in_progress.len()
    }
}
