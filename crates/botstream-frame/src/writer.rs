use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::trace;
use uuid::Uuid;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::header::PayloadType;

/// Writes frames to an async byte stream.
///
/// Shared by every sender on a connection: each frame's header and payload
/// are written under one lock, so frames from concurrent tasks never
/// interleave on the wire.
///
/// Writes are cancel-safe. If a `write_frame` future is dropped part way
/// through a frame, the unsent tail stays queued and is written before the
/// next frame (or before shutdown), so the wire only ever carries whole
/// frames.
pub struct FrameWriter<W> {
    state: Mutex<WriteState<W>>,
    config: FrameConfig,
}

struct WriteState<W> {
    io: W,
    buf: BytesMut,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: W, config: FrameConfig) -> Self {
        Self {
            state: Mutex::new(WriteState {
                io: inner,
                buf: BytesMut::with_capacity(config.max_payload_size + crate::HEADER_SIZE),
            }),
            config,
        }
    }

    /// Write a complete frame and flush it.
    pub async fn write_frame(&self, frame: &Frame) -> Result<()> {
        if frame.payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max: self.config.max_payload_size,
            });
        }

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if !state.buf.is_empty() {
            trace!(pending = state.buf.len(), "finishing interrupted frame");
            state.drain().await?;
        }
        if let Err(err) = encode_frame(frame, &mut state.buf) {
            state.buf.clear();
            return Err(err);
        }
        state.drain().await?;
        state.io.flush().await.map_err(io_to_frame_error)?;

        trace!(
            kind = %frame.payload_type(),
            id = %frame.id(),
            len = frame.payload.len(),
            end = frame.is_end(),
            "frame written"
        );
        Ok(())
    }

    /// Convenience: build and write a frame in one call.
    pub async fn send(
        &self,
        payload_type: PayloadType,
        id: Uuid,
        end: bool,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        self.write_frame(&Frame::new(payload_type, id, end, payload))
            .await
    }

    /// Shut down the write half of the underlying stream.
    pub async fn shutdown(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.drain().await?;
        state.io.shutdown().await.map_err(io_to_frame_error)
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn into_inner(self) -> W {
        self.state.into_inner().io
    }
}

impl<W: AsyncWrite + Unpin> WriteState<W> {
    /// Write out everything queued in `buf`, consuming it as bytes land.
    async fn drain(&mut self) -> Result<()> {
        while !self.buf.is_empty() {
            let n = self.io.write(&self.buf).await.map_err(io_to_frame_error)?;
            if n == 0 {
                return Err(FrameError::ConnectionClosed);
            }
            self.buf.advance(n);
        }
        Ok(())
    }
}

fn io_to_frame_error(err: std::io::Error) -> FrameError {
    match err.kind() {
        std::io::ErrorKind::WriteZero
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::ConnectionReset => FrameError::ConnectionClosed,
        _ => FrameError::Io(err),
    }
}
