use std::sync::Arc;

use bytes::Bytes;
use botstream_frame::{Frame, FrameWriter, PayloadType};
use dashmap::DashMap;
use futures_util::future::try_join_all;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{OutgoingStream, StreamContent, StreamingRequest, StreamingResponse};

/// Split `data` into frames of at most `max_payload` bytes.
///
/// Every frame carries `id`; only the last is marked as the end. Empty data
/// still yields one (empty, final) frame.
pub fn disassemble_bytes(
    payload_type: PayloadType,
    id: Uuid,
    data: Bytes,
    max_payload: usize,
) -> Vec<Frame> {
    let max_payload = max_payload.max(1);
    if data.is_empty() {
        return vec![Frame::new(payload_type, id, true, data)];
    }

    let count = data.len().div_ceil(max_payload);
    (0..count)
        .map(|i| {
            let start = i * max_payload;
            let end = (start + max_payload).min(data.len());
            Frame::new(payload_type, id, i + 1 == count, data.slice(start..end))
        })
        .collect()
}

/// Fragments outgoing requests, responses and their streams onto one writer.
///
/// Attached streams are sent concurrently; the shared [`FrameWriter`] keeps
/// each frame contiguous on the wire. Every message and stream being sent can
/// be aborted by id through [`abort`](Self::abort).
pub struct Disassembler<W> {
    writer: Arc<FrameWriter<W>>,
    max_payload: usize,
    active: DashMap<Uuid, CancellationToken>,
    shutdown: CancellationToken,
}

/// Deregisters a message and its streams once sending finishes or is dropped.
struct ActiveGuard<'a> {
    active: &'a DashMap<Uuid, CancellationToken>,
    ids: Vec<Uuid>,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        for id in &self.ids {
            self.active.remove(id);
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> Disassembler<W> {
    pub fn new(writer: Arc<FrameWriter<W>>) -> Self {
        let max_payload = writer.config().max_payload_size;
        Self {
            writer,
            max_payload,
            active: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn writer(&self) -> &Arc<FrameWriter<W>> {
        &self.writer
    }

    pub async fn send_request(&self, id: Uuid, request: StreamingRequest) -> Result<()> {
        let body = serde_json::to_vec(&request.payload())?;
        self.send_message(PayloadType::Request, id, body, request.streams)
            .await
    }

    pub async fn send_response(&self, id: Uuid, response: StreamingResponse) -> Result<()> {
        let body = serde_json::to_vec(&response.payload())?;
        self.send_message(PayloadType::Response, id, body, response.streams)
            .await
    }

    /// Ask the peer to stop every stream of message `id`.
    pub async fn send_cancel_all(&self, id: Uuid) -> Result<()> {
        self.writer
            .write_frame(&Frame::empty(PayloadType::CancelAll, id))
            .await?;
        Ok(())
    }

    /// Ask the peer to stop sending stream `id`.
    pub async fn send_cancel_stream(&self, id: Uuid) -> Result<()> {
        self.writer
            .write_frame(&Frame::empty(PayloadType::CancelStream, id))
            .await?;
        Ok(())
    }

    /// Stop sending the message or stream registered under `id`.
    ///
    /// Aborting a message aborts all of its streams. Returns false if nothing
    /// with that id is being sent.
    pub fn abort(&self, id: Uuid) -> bool {
        match self.active.get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Abort everything in flight, including messages started afterwards.
    pub fn abort_all(&self) {
        self.shutdown.cancel();
    }

    /// Number of messages and streams currently being sent.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    async fn send_message(
        &self,
        payload_type: PayloadType,
        id: Uuid,
        body: Vec<u8>,
        streams: Vec<OutgoingStream>,
    ) -> Result<()> {
        let message_token = self.shutdown.child_token();
        let mut guard = ActiveGuard {
            active: &self.active,
            ids: Vec::with_capacity(streams.len() + 1),
        };
        self.active.insert(id, message_token.clone());
        guard.ids.push(id);

        let mut tasks = Vec::with_capacity(streams.len());
        for stream in streams {
            let token = message_token.child_token();
            self.active.insert(stream.id, token.clone());
            guard.ids.push(stream.id);
            tasks.push((stream, token));
        }

        for frame in disassemble_bytes(payload_type, id, Bytes::from(body), self.max_payload) {
            if message_token.is_cancelled() {
                debug!(%id, "message aborted before it was sent");
                return Ok(());
            }
            self.writer.write_frame(&frame).await?;
        }

        try_join_all(
            tasks
                .into_iter()
                .map(|(stream, token)| self.send_stream(stream, token)),
        )
        .await?;
        Ok(())
    }

    async fn send_stream(&self, stream: OutgoingStream, cancel: CancellationToken) -> Result<()> {
        let id = stream.id;
        match stream.content {
            StreamContent::Bytes(data) => {
                for frame in disassemble_bytes(PayloadType::Stream, id, data, self.max_payload) {
                    if cancel.is_cancelled() {
                        debug!(stream = %id, "stream aborted");
                        return Ok(());
                    }
                    self.writer.write_frame(&frame).await?;
                }
            }
            StreamContent::Reader { reader, .. } => {
                self.pump_reader(id, reader, &cancel).await?;
            }
        }
        Ok(())
    }

    /// Forward `reader` chunk by chunk, then a zero-length final frame at EOF.
    async fn pump_reader(
        &self,
        id: Uuid,
        mut reader: Box<dyn AsyncRead + Send + Unpin>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut chunk = vec![0u8; self.max_payload];
        loop {
            let n = tokio::select! {
                read = reader.read(&mut chunk) => read?,
                _ = cancel.cancelled() => {
                    debug!(stream = %id, "stream aborted");
                    return Ok(());
                }
            };
            if n == 0 {
                self.writer
                    .write_frame(&Frame::empty(PayloadType::Stream, id))
                    .await?;
                return Ok(());
            }
            let frame = Frame::new(
                PayloadType::Stream,
                id,
                false,
                Bytes::copy_from_slice(&chunk[..n]),
            );
            self.writer.write_frame(&frame).await?;
        }
    }
}

impl<W> Drop for Disassembler<W> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use botstream_frame::{FrameConfig, FrameReader};

    use super::*;
    use crate::models::RequestPayload;

    fn disassembler<W: AsyncWrite + Unpin + Send>(io: W, max: usize) -> Disassembler<W> {
        let config = FrameConfig::default().with_max_payload_size(max);
        Disassembler::new(Arc::new(FrameWriter::with_config(io, config)))
    }

    async fn frames_of(wire: Vec<u8>) -> Vec<Frame> {
        let mut reader = FrameReader::new(&wire[..]);
        let mut frames = Vec::new();
        while let Ok(frame) = reader.read_frame().await {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn three_hundred_bytes_at_256() {
        let id = Uuid::new_v4();
        let frames = disassemble_bytes(PayloadType::Request, id, Bytes::from(vec![b'x'; 300]), 256);
        let shape: Vec<(usize, bool)> = frames
            .iter()
            .map(|f| (f.header.payload_length, f.header.end))
            .collect();
        assert_eq!(shape, vec![(256, false), (44, true)]);
        assert!(frames.iter().all(|f| f.id() == id));
    }

    #[test]
    fn exact_multiple_and_empty() {
        let id = Uuid::new_v4();
        let frames = disassemble_bytes(PayloadType::Stream, id, Bytes::from(vec![0u8; 512]), 256);
        assert_eq!(frames.len(), 2);
        assert!(frames[1].is_end());

        let empty = disassemble_bytes(PayloadType::Stream, id, Bytes::new(), 256);
        assert_eq!(empty.len(), 1);
        assert!(empty[0].is_end());
        assert!(empty[0].payload.is_empty());
    }

    #[tokio::test]
    async fn request_then_streams_on_the_wire() {
        let arc_writer = Arc::new(FrameWriter::with_config(
            Vec::new(),
            FrameConfig::default().with_max_payload_size(8),
        ));
        let disassembler = Disassembler::new(Arc::clone(&arc_writer));

        let id = Uuid::new_v4();
        let mut request = StreamingRequest::post("/api/messages");
        request.set_body(Some("text/plain".into()), &b"twelve bytes"[..]);
        let body_id = request.streams[0].id;
        disassembler.send_request(id, request).await.unwrap();
        assert_eq!(disassembler.active_count(), 0);

        drop(disassembler);
        let writer = Arc::into_inner(arc_writer).unwrap();
        let frames = frames_of(writer.into_inner()).await;

        let request_frames: Vec<&Frame> = frames
            .iter()
            .filter(|f| f.payload_type() == PayloadType::Request)
            .collect();
        assert!(request_frames.iter().all(|f| f.id() == id));
        assert!(request_frames.last().unwrap().is_end());
        let json: Vec<u8> = request_frames
            .iter()
            .flat_map(|f| f.payload.iter().copied())
            .collect();
        let payload: RequestPayload = serde_json::from_slice(&json).unwrap();
        assert_eq!(payload.streams[0].id, body_id);
        assert_eq!(payload.streams[0].length, Some(12));

        let stream_frames: Vec<&Frame> = frames
            .iter()
            .filter(|f| f.payload_type() == PayloadType::Stream)
            .collect();
        assert_eq!(stream_frames.len(), 2);
        assert!(stream_frames.iter().all(|f| f.id() == body_id));
        assert_eq!(stream_frames[0].payload, "twelve b");
        assert_eq!(stream_frames[1].payload, "ytes");
        assert!(stream_frames[1].is_end());
    }

    #[tokio::test]
    async fn reader_stream_ends_with_empty_frame() {
        let writer = Arc::new(FrameWriter::with_config(
            Vec::new(),
            FrameConfig::default().with_max_payload_size(4),
        ));
        let disassembler = Disassembler::new(Arc::clone(&writer));

        let mut response = StreamingResponse::ok();
        response.add_stream(OutgoingStream::from_reader(None, &b"abcdef"[..], None));
        disassembler.send_response(Uuid::new_v4(), response).await.unwrap();
        drop(disassembler);

        let frames = frames_of(Arc::into_inner(writer).unwrap().into_inner()).await;
        let data: Vec<&Frame> = frames
            .iter()
            .filter(|f| f.payload_type() == PayloadType::Stream)
            .collect();
        let bytes: Vec<u8> = data.iter().flat_map(|f| f.payload.iter().copied()).collect();
        assert_eq!(bytes, b"abcdef");
        let last = data.last().unwrap();
        assert!(last.is_end());
        assert!(last.payload.is_empty());
        assert!(data[..data.len() - 1].iter().all(|f| !f.is_end()));
    }

    #[tokio::test]
    async fn abort_stops_a_never_ending_stream() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let disassembler = Arc::new(disassembler(client, 64));

        // Source that never reaches EOF while `_source_tx` is alive.
        let (source_rx, _source_tx) = tokio::io::duplex(64);
        let mut request = StreamingRequest::post("/upload");
        request.add_stream(OutgoingStream::from_reader(None, source_rx, None));
        let message_id = Uuid::new_v4();

        let sender = {
            let disassembler = Arc::clone(&disassembler);
            tokio::spawn(async move { disassembler.send_request(message_id, request).await })
        };

        let mut reader = FrameReader::new(server);
        loop {
            let frame = reader.read_frame().await.unwrap();
            if frame.payload_type() == PayloadType::Request && frame.is_end() {
                break;
            }
        }

        assert!(disassembler.abort(message_id));
        sender.await.unwrap().unwrap();
        assert_eq!(disassembler.active_count(), 0);
        assert!(!disassembler.abort(message_id));
    }

    #[tokio::test]
    async fn cancel_frames_are_empty_and_final() {
        let writer = Arc::new(FrameWriter::new(Vec::new()));
        let disassembler = Disassembler::new(Arc::clone(&writer));
        let id = Uuid::new_v4();
        disassembler.send_cancel_all(id).await.unwrap();
        disassembler.send_cancel_stream(id).await.unwrap();
        drop(disassembler);

        let frames = frames_of(Arc::into_inner(writer).unwrap().into_inner()).await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload_type(), PayloadType::CancelAll);
        assert_eq!(frames[1].payload_type(), PayloadType::CancelStream);
        assert!(frames.iter().all(|f| f.is_end() && f.payload.is_empty() && f.id() == id));
    }
}
