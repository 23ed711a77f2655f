use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::trace;

use crate::codec::{Frame, FrameCodec, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_CAPACITY: usize = 8 * 1024;

/// Reads frames from an async byte stream.
pub struct FrameReader<R> {
    inner: FramedRead<R, FrameCodec>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, &FrameConfig::default())
    }

    pub fn with_config(inner: R, config: &FrameConfig) -> Self {
        Self {
            inner: FramedRead::with_capacity(inner, FrameCodec::new(config), INITIAL_CAPACITY),
        }
    }

    /// Read the next complete frame.
    ///
    /// Returns [`FrameError::ConnectionClosed`] once the stream ends, whether
    /// cleanly between frames or in the middle of one.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        match self.inner.next().await {
            Some(Ok(frame)) => {
                trace!(
                    kind = %frame.payload_type(),
                    id = %frame.id(),
                    len = frame.payload.len(),
                    end = frame.is_end(),
                    "frame read"
                );
                Ok(frame)
            }
            Some(Err(err)) => Err(err),
            None => Err(FrameError::ConnectionClosed),
        }
    }

    pub fn get_ref(&self) -> &R {
        self.inner.get_ref()
    }

    pub fn get_mut(&mut self) -> &mut R {
        self.inner.get_mut()
    }

    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use tokio::io::AsyncWriteExt;
    use uuid::Uuid;

    use super::*;
    use crate::codec::encode_frame;
    use crate::header::{PayloadType, HEADER_SIZE};

    fn encode_all(frames: &[Frame]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for frame in frames {
            encode_frame(frame, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[tokio::test]
    async fn read_single_frame() {
        let frame = Frame::new(PayloadType::Request, Uuid::new_v4(), true, &b"{}"[..]);
        let wire = encode_all(std::slice::from_ref(&frame));
        let mut reader = FrameReader::new(&wire[..]);

        assert_eq!(reader.read_frame().await.unwrap(), frame);
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn read_multiple_frames() {
        let id = Uuid::new_v4();
        let frames = vec![
            Frame::new(PayloadType::Stream, id, false, &b"one"[..]),
            Frame::new(PayloadType::Stream, id, false, &b"two"[..]),
            Frame::new(PayloadType::Stream, id, true, &b"three"[..]),
        ];
        let wire = encode_all(&frames);
        let mut reader = FrameReader::new(&wire[..]);

        for expected in &frames {
            assert_eq!(&reader.read_frame().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn partial_read_handling() {
        let frame = Frame::new(PayloadType::Response, Uuid::new_v4(), true, vec![7u8; 300]);
        let wire = encode_all(std::slice::from_ref(&frame));

        // A one-byte pipe forces the reader to assemble the frame piecemeal.
        let (mut tx, rx) = tokio::io::duplex(1);
        let writer = tokio::spawn(async move {
            tx.write_all(&wire).await.unwrap();
        });

        let mut reader = FrameReader::new(rx);
        assert_eq!(reader.read_frame().await.unwrap(), frame);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn connection_closed_mid_frame() {
        let frame = Frame::new(PayloadType::Stream, Uuid::new_v4(), true, &b"truncated"[..]);
        let wire = encode_all(std::slice::from_ref(&frame));
        let cut = &wire[..HEADER_SIZE + 3];

        let mut reader = FrameReader::new(cut);
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn invalid_header_in_stream() {
        let mut wire = encode_all(&[Frame::empty(PayloadType::CancelAll, Uuid::new_v4())]);
        wire[8] = b'-';
        let mut reader = FrameReader::new(&wire[..]);

        let err = reader.read_frame().await.unwrap_err();
        assert!(err.is_framing());
    }

    #[tokio::test]
    async fn oversized_frame_in_stream() {
        let wire = encode_all(&[Frame::new(
            PayloadType::Stream,
            Uuid::new_v4(),
            true,
            vec![0u8; 2048],
        )]);
        let config = FrameConfig::default().with_max_inbound_payload(1024);
        let mut reader = FrameReader::with_config(&wire[..], &config);

        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::PayloadTooLarge { size: 2048, max: 1024 })
        ));
    }

    #[tokio::test]
    async fn accessors_and_into_inner() {
        let data: &[u8] = b"";
        let mut reader = FrameReader::new(data);
        assert!(reader.get_ref().is_empty());
        let _ = reader.get_mut();
        assert!(reader.into_inner().is_empty());
    }
}
