use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use tokio::sync::Notify;

use crate::error::{PayloadError, Result};

/// Producer/consumer byte handoff for one logical stream.
///
/// The producer appends chunks without blocking; the consumer suspends (async)
/// or blocks (sync) until data, end of stream, or cancellation. A read returns
/// bytes from at most one chunk and an empty [`Bytes`] means end of data.
///
/// When a declared length is set, end of data is reported as soon as that many
/// bytes have been consumed, even if the producer sent more.
#[derive(Debug)]
pub struct ChunkBuffer {
    state: Mutex<BufferState>,
    notify: Notify,
    condvar: Condvar,
    limit: Option<usize>,
}

#[derive(Debug, Default)]
struct BufferState {
    chunks: VecDeque<Bytes>,
    buffered: usize,
    received: usize,
    consumed: usize,
    declared_length: Option<usize>,
    ended: bool,
    cancelled: bool,
}

enum Step {
    Data(Bytes),
    Eof,
    Pending,
}

impl BufferState {
    fn exhausted(&self) -> bool {
        matches!(self.declared_length, Some(declared) if self.consumed >= declared)
    }

    fn take(&mut self, max: usize) -> Step {
        if self.cancelled || self.exhausted() {
            return Step::Eof;
        }
        let Some(front) = self.chunks.front_mut() else {
            return if self.ended { Step::Eof } else { Step::Pending };
        };

        let mut n = front.len().min(max);
        if let Some(declared) = self.declared_length {
            n = n.min(declared - self.consumed);
        }
        let data = front.split_to(n);
        if front.is_empty() {
            self.chunks.pop_front();
        }
        self.buffered -= n;
        self.consumed += n;
        Step::Data(data)
    }
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkBuffer {
    /// An unbounded buffer.
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    /// A buffer that rejects writes once `limit` unread bytes are held.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            state: Mutex::new(BufferState::default()),
            notify: Notify::new(),
            condvar: Condvar::new(),
            limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wake(&self) {
        self.notify.notify_waiters();
        self.condvar.notify_all();
    }

    /// Append a chunk. A no-op after cancellation or end of stream.
    pub fn write(&self, chunk: Bytes) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        {
            let mut state = self.lock();
            if state.cancelled || state.ended {
                return Ok(());
            }
            if let Some(limit) = self.limit {
                if state.buffered + chunk.len() > limit {
                    return Err(PayloadError::BufferOverflow {
                        buffered: state.buffered,
                        limit,
                    });
                }
            }
            state.buffered += chunk.len();
            state.received += chunk.len();
            state.chunks.push_back(chunk);
        }
        self.wake();
        Ok(())
    }

    /// Mark that no more data will be written.
    pub fn signal_end(&self) {
        self.lock().ended = true;
        self.wake();
    }

    /// Abort both ends: waiting readers see end of data, later writes are dropped.
    pub fn cancel(&self) {
        {
            let mut state = self.lock();
            state.cancelled = true;
            state.chunks.clear();
            state.buffered = 0;
        }
        self.wake();
    }

    pub fn set_declared_length(&self, length: usize) {
        self.lock().declared_length = Some(length);
        self.wake();
    }

    /// Read up to `max` bytes, waiting until something is available.
    pub async fn read(&self, max: usize) -> Bytes {
        if max == 0 {
            return Bytes::new();
        }
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let step = self.lock().take(max);
            match step {
                Step::Data(data) => return data,
                Step::Eof => return Bytes::new(),
                Step::Pending => notified.await,
            }
        }
    }

    /// Blocking variant of [`read`](Self::read) for synchronous consumers.
    ///
    /// Must not be called from inside an async task.
    pub fn read_blocking(&self, max: usize) -> Bytes {
        if max == 0 {
            return Bytes::new();
        }
        let mut state = self.lock();
        loop {
            match state.take(max) {
                Step::Data(data) => return data,
                Step::Eof => return Bytes::new(),
                Step::Pending => {
                    state = self
                        .condvar
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    /// Drain everything buffered so far into one contiguous chunk.
    pub fn take_all(&self) -> Bytes {
        let mut state = self.lock();
        let mut out = BytesMut::with_capacity(state.buffered);
        while let Some(chunk) = state.chunks.pop_front() {
            out.extend_from_slice(&chunk);
        }
        let drained = std::mem::take(&mut state.buffered);
        state.consumed += drained;
        out.freeze()
    }

    /// True once the stream ended and every declared byte was consumed.
    pub fn is_complete(&self) -> bool {
        let state = self.lock();
        if !state.ended {
            return false;
        }
        match state.declared_length {
            Some(declared) => state.consumed >= declared,
            None => true,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    pub fn declared_length(&self) -> Option<usize> {
        self.lock().declared_length
    }

    /// Total bytes accepted from the producer.
    pub fn received(&self) -> usize {
        self.lock().received
    }

    /// Total bytes handed to the consumer.
    pub fn consumed(&self) -> usize {
        self.lock().consumed
    }

    /// Bytes written but not yet read.
    pub fn buffered(&self) -> usize {
        self.lock().buffered
    }
}
