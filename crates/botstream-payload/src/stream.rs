use std::fmt;
use std::io;
use std::sync::{Arc, Weak};

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::buffer::ChunkBuffer;
use crate::error::Result;
use crate::registry::{RegistryInner, StreamRegistry};

const READ_CHUNK: usize = 16 * 1024;

/// Readable handle on an incoming content stream.
///
/// The handle shares its [`ChunkBuffer`] with the registry's producer side.
/// Closing it (explicitly or by dropping it) removes the stream from the
/// registry; if the stream was not fully received and consumed, the registry
/// reports the abort to its cancel handler.
pub struct ContentStream {
    id: Uuid,
    content_type: Option<String>,
    declared_length: Option<usize>,
    buffer: Arc<ChunkBuffer>,
    registry: Weak<RegistryInner>,
    closed: bool,
}

impl ContentStream {
    pub(crate) fn new(
        id: Uuid,
        content_type: Option<String>,
        declared_length: Option<usize>,
        buffer: Arc<ChunkBuffer>,
        registry: Weak<RegistryInner>,
    ) -> Self {
        Self {
            id,
            content_type,
            declared_length,
            buffer,
            registry,
            closed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn declared_length(&self) -> Option<usize> {
        self.declared_length
    }

    /// Bytes handed out so far.
    pub fn consumed(&self) -> usize {
        self.buffer.consumed()
    }

    /// Read up to `max` bytes. An empty result means end of data.
    pub async fn read(&self, max: usize) -> Bytes {
        self.buffer.read(max).await
    }

    /// Blocking read for synchronous consumers.
    pub fn read_blocking(&self, max: usize) -> Bytes {
        self.buffer.read_blocking(max)
    }

    /// Read until end of data.
    pub async fn read_to_end(&self) -> Bytes {
        // The declared length comes from the remote peer; only trust it so far.
        let mut out = BytesMut::with_capacity(self.declared_length.unwrap_or(0).min(READ_CHUNK));
        loop {
            let chunk = self.buffer.read(READ_CHUNK).await;
            if chunk.is_empty() {
                return out.freeze();
            }
            out.extend_from_slice(&chunk);
        }
    }

    pub async fn read_to_string(&self) -> Result<String> {
        let body = self.read_to_end().await;
        String::from_utf8(body.to_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
    }

    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T> {
        let body = self.read_to_end().await;
        Ok(serde_json::from_slice(&body)?)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop consuming and release the stream.
    ///
    /// Further reads report end of data. Calling `close` more than once is a
    /// no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match self.registry.upgrade() {
            Some(inner) => {
                StreamRegistry::from_inner(inner).close(self.id);
            }
            None => self.buffer.cancel(),
        }
    }
}

impl io::Read for ContentStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = self.buffer.read_blocking(buf.len());
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }
}

impl Drop for ContentStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStream")
            .field("id", &self.id)
            .field("content_type", &self.content_type)
            .field("declared_length", &self.declared_length)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use botstream_frame::{Header, PayloadType};

    use super::*;
    use crate::models::StreamDescription;
    use crate::registry::StreamAssembler;

    fn stream_header(id: Uuid, len: usize, end: bool) -> Header {
        Header::new(PayloadType::Stream, id, len, end)
    }

    fn description(id: Uuid, length: Option<usize>) -> StreamDescription {
        StreamDescription {
            id,
            content_type: Some("text/plain".into()),
            length,
        }
    }

    #[tokio::test]
    async fn read_to_string_after_frames() {
        let registry = StreamRegistry::new();
        let id = Uuid::new_v4();
        registry
            .on_receive(&stream_header(id, 6, false), Bytes::from_static(b"hello "))
            .unwrap();
        registry
            .on_receive(&stream_header(id, 5, true), Bytes::from_static(b"world"))
            .unwrap();

        let stream = registry.get_stream(&description(id, Some(11)));
        assert_eq!(stream.content_type(), Some("text/plain"));
        assert_eq!(stream.read_to_string().await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn read_json_body() {
        let registry = StreamRegistry::new();
        let id = Uuid::new_v4();
        let stream = registry.get_stream(&description(id, None));
        registry
            .on_receive(&stream_header(id, 9, true), Bytes::from_static(b"{\"n\":42}\n"))
            .unwrap();

        let value: serde_json::Value = stream.read_json().await.unwrap();
        assert_eq!(value["n"], 42);
    }

    #[tokio::test]
    async fn oversized_declared_length_is_not_preallocated() {
        let registry = StreamRegistry::new();
        let id = Uuid::new_v4();
        registry
            .on_receive(&stream_header(id, 2, true), Bytes::from_static(b"hi"))
            .unwrap();

        let stream = registry.get_stream(&description(id, Some(usize::MAX)));
        assert_eq!(stream.read_to_end().await.as_ref(), b"hi");
    }

    #[test]
    fn std_read_adapter() {
        let registry = StreamRegistry::new();
        let id = Uuid::new_v4();
        registry
            .on_receive(&stream_header(id, 4, true), Bytes::from_static(b"sync"))
            .unwrap();

        let mut stream = registry.get_stream(&description(id, Some(4)));
        let mut out = String::new();
        Read::read_to_string(&mut stream, &mut out).unwrap();
        assert_eq!(out, "sync");
    }

    #[test]
    fn drop_closes_and_reports_incomplete_stream() {
        let cancelled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&cancelled);
        let registry = StreamRegistry::builder()
            .cancel_handler(move |_: &StreamAssembler| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        let id = Uuid::new_v4();

        let stream = registry.get_stream(&description(id, Some(100)));
        assert_eq!(registry.len(), 1);
        drop(stream);

        assert_eq!(registry.len(), 0);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn explicit_close_is_idempotent() {
        let cancelled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&cancelled);
        let registry = StreamRegistry::builder()
            .cancel_handler(move |_: &StreamAssembler| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        let id = Uuid::new_v4();
        registry
            .on_receive(&stream_header(id, 3, true), Bytes::from_static(b"abc"))
            .unwrap();

        let mut stream = registry.get_stream(&description(id, Some(3)));
        assert_eq!(stream.read_to_end().await, "abc");
        stream.close();
        stream.close();
        assert!(stream.is_closed());
        drop(stream);

        assert_eq!(cancelled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn close_after_registry_dropped_cancels_buffer() {
        let registry = StreamRegistry::new();
        let id = Uuid::new_v4();
        let mut stream = registry.get_stream(&description(id, None));
        drop(registry);

        stream.close();
        assert!(stream.read(8).await.is_empty());
    }
}
