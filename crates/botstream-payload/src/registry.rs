use std::sync::Arc;

use bytes::Bytes;
use botstream_frame::Header;
use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::buffer::ChunkBuffer;
use crate::error::Result;
use crate::models::StreamDescription;
use crate::stream::ContentStream;

/// Receives streams that were closed before they were fully received.
pub trait StreamCancelHandler: Send + Sync {
    fn on_cancel_stream(&self, assembler: &StreamAssembler);
}

impl<F> StreamCancelHandler for F
where
    F: Fn(&StreamAssembler) + Send + Sync,
{
    fn on_cancel_stream(&self, assembler: &StreamAssembler) {
        self(assembler)
    }
}

/// Producer side of one incoming content stream.
#[derive(Debug)]
pub struct StreamAssembler {
    id: Uuid,
    buffer: Arc<ChunkBuffer>,
}

impl StreamAssembler {
    fn new(id: Uuid, limit: Option<usize>) -> Self {
        Self {
            id,
            buffer: Arc::new(ChunkBuffer::with_limit(limit)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn buffer(&self) -> &Arc<ChunkBuffer> {
        &self.buffer
    }
}

pub(crate) struct RegistryInner {
    assemblers: DashMap<Uuid, Arc<StreamAssembler>>,
    cancel_handler: Option<Arc<dyn StreamCancelHandler>>,
    buffer_limit: Option<usize>,
}

/// Per-connection map of incoming content streams, keyed by stream id.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct StreamRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Configures a [`StreamRegistry`] before it is shared.
#[derive(Default)]
pub struct StreamRegistryBuilder {
    cancel_handler: Option<Arc<dyn StreamCancelHandler>>,
    buffer_limit: Option<usize>,
}

impl StreamRegistryBuilder {
    /// Install the handler told about streams closed before completion.
    pub fn cancel_handler(mut self, handler: impl StreamCancelHandler + 'static) -> Self {
        self.cancel_handler = Some(Arc::new(handler));
        self
    }

    /// Bound the unread bytes each stream may hold.
    pub fn buffer_limit(mut self, limit: Option<usize>) -> Self {
        self.buffer_limit = limit;
        self
    }

    pub fn build(self) -> StreamRegistry {
        StreamRegistry {
            inner: Arc::new(RegistryInner {
                assemblers: DashMap::new(),
                cancel_handler: self.cancel_handler,
                buffer_limit: self.buffer_limit,
            }),
        }
    }
}

impl StreamRegistry {
    /// An unbounded registry without a cancel handler.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> StreamRegistryBuilder {
        StreamRegistryBuilder::default()
    }

    /// Per-stream buffering limit, if one was configured.
    pub fn buffer_limit(&self) -> Option<usize> {
        self.inner.buffer_limit
    }

    pub(crate) fn from_inner(inner: Arc<RegistryInner>) -> Self {
        Self { inner }
    }

    /// Atomically fetch the assembler for `id`, creating it if absent.
    pub fn get_or_create(&self, id: Uuid) -> Arc<StreamAssembler> {
        let limit = self.inner.buffer_limit;
        let entry = self
            .inner
            .assemblers
            .entry(id)
            .or_insert_with(|| Arc::new(StreamAssembler::new(id, limit)));
        Arc::clone(entry.value())
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<StreamAssembler>> {
        self.inner
            .assemblers
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Route one `Stream` frame's payload to its assembler.
    ///
    /// A write that overflows the buffer limit cancels and closes the stream
    /// (reporting it to the cancel handler) before the error is returned.
    pub fn on_receive(&self, header: &Header, payload: Bytes) -> Result<()> {
        let assembler = self.get_or_create(header.id);
        if let Err(err) = assembler.buffer.write(payload) {
            warn!(stream = %header.id, error = %err, "dropping stream");
            self.close(header.id);
            assembler.buffer.cancel();
            return Err(err);
        }
        if header.end {
            assembler.buffer.signal_end();
        }
        Ok(())
    }

    /// Hand out a readable stream for a description found in a structured payload.
    pub fn get_stream(&self, description: &StreamDescription) -> ContentStream {
        let assembler = self.get_or_create(description.id);
        if let Some(length) = description.length {
            assembler.buffer.set_declared_length(length);
        }
        ContentStream::new(
            description.id,
            description.content_type.clone(),
            description.length,
            Arc::clone(&assembler.buffer),
            Arc::downgrade(&self.inner),
        )
    }

    /// Remove the stream; report it if it was not fully received and consumed.
    ///
    /// Returns false if no stream with `id` was registered.
    pub fn close(&self, id: Uuid) -> bool {
        let Some((_, assembler)) = self.inner.assemblers.remove(&id) else {
            return false;
        };
        let complete = assembler.buffer.is_complete();
        assembler.buffer.cancel();

        if complete {
            debug!(stream = %id, "stream closed");
        } else {
            debug!(
                stream = %id,
                consumed = assembler.buffer.consumed(),
                declared = ?assembler.buffer.declared_length(),
                "stream closed before completion"
            );
            if let Some(handler) = &self.inner.cancel_handler {
                handler.on_cancel_stream(&assembler);
            }
        }
        true
    }

    /// Cancel and forget every stream, without notifying the cancel handler.
    ///
    /// Used when the connection itself is gone.
    pub fn cancel_all(&self) {
        let ids: Vec<Uuid> = self.inner.assemblers.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, assembler)) = self.inner.assemblers.remove(&id) {
                assembler.buffer.cancel();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.assemblers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.assemblers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use botstream_frame::PayloadType;

    use super::*;
    use crate::error::PayloadError;

    fn header(id: Uuid, payload: &[u8], end: bool) -> Header {
        Header::new(PayloadType::Stream, id, payload.len(), end)
    }

    fn feed(registry: &StreamRegistry, id: Uuid, payload: &'static [u8], end: bool) {
        registry
            .on_receive(&header(id, payload, end), Bytes::from_static(payload))
            .unwrap();
    }

    fn counting_registry() -> (StreamRegistry, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let registry = StreamRegistry::builder()
            .cancel_handler(move |_: &StreamAssembler| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        (registry, count)
    }

    #[tokio::test]
    async fn interleaved_frames_demultiplex() {
        let registry = StreamRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        feed(&registry, a, b"A1-", false);
        feed(&registry, b, b"B1-", false);
        feed(&registry, a, b"A2-", false);
        feed(&registry, b, b"B2-", false);
        feed(&registry, a, b"A3", true);
        feed(&registry, b, b"B3", true);

        let desc = |id| StreamDescription {
            id,
            content_type: None,
            length: None,
        };
        let stream_a = registry.get_stream(&desc(a));
        let stream_b = registry.get_stream(&desc(b));
        assert_eq!(stream_a.read_to_end().await, "A1-A2-A3");
        assert_eq!(stream_b.read_to_end().await, "B1-B2-B3");
    }

    #[test]
    fn racing_creators_converge() {
        let registry = StreamRegistry::new();
        let id = Uuid::new_v4();
        let winners = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let assembler = registry.get_or_create(id);
                    winners.lock().unwrap().push(assembler);
                });
            }
        });

        let winners = winners.into_inner().unwrap();
        assert!(winners.iter().all(|a| Arc::ptr_eq(a, &winners[0])));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn close_of_complete_stream_is_silent() {
        let (registry, cancels) = counting_registry();
        let id = Uuid::new_v4();
        feed(&registry, id, b"data", true);

        let stream = registry.get_stream(&StreamDescription {
            id,
            content_type: None,
            length: Some(4),
        });
        assert_eq!(stream.read_to_end().await, "data");
        assert!(registry.close(id));
        assert_eq!(cancels.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn close_before_end_reports_once() {
        let (registry, cancels) = counting_registry();
        let id = Uuid::new_v4();
        feed(&registry, id, b"partial", false);

        assert!(registry.close(id));
        assert!(!registry.close(id));
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_with_unconsumed_declared_bytes_reports() {
        let (registry, cancels) = counting_registry();
        let id = Uuid::new_v4();
        feed(&registry, id, b"0123456789", true);

        let stream = registry.get_stream(&StreamDescription {
            id,
            content_type: None,
            length: Some(10),
        });
        assert_eq!(stream.read_blocking(4), "0123");
        drop(stream);

        assert_eq!(cancels.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn overflow_cancels_stream() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let registry = StreamRegistry::builder()
            .buffer_limit(Some(4))
            .cancel_handler(move |assembler: &StreamAssembler| {
                assert!(!assembler.id().is_nil());
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        let id = Uuid::new_v4();
        feed(&registry, id, b"abc", false);

        let err = registry
            .on_receive(&header(id, b"defg", false), Bytes::from_static(b"defg"))
            .unwrap_err();
        assert!(matches!(err, PayloadError::BufferOverflow { .. }));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(registry.get(id).is_none());
    }

    #[test]
    fn cancel_all_is_silent_and_unblocks_readers() {
        let (registry, cancels) = counting_registry();
        let id = Uuid::new_v4();
        let stream = registry.get_stream(&StreamDescription {
            id,
            content_type: None,
            length: None,
        });

        registry.cancel_all();
        assert!(registry.is_empty());
        assert!(stream.read_blocking(8).is_empty());
        drop(stream);
        assert_eq!(cancels.load(Ordering::SeqCst), 0);
    }
}
