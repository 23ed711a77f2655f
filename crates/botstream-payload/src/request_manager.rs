use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::error::{PayloadError, Result};
use crate::models::ReceiveResponse;

/// How a pending request resolved.
#[derive(Debug)]
pub enum ResponseOutcome {
    Completed(ReceiveResponse),
    Cancelled,
    TimedOut,
}

impl ResponseOutcome {
    pub fn into_response(self) -> Option<ReceiveResponse> {
        match self {
            ResponseOutcome::Completed(response) => Some(response),
            _ => None,
        }
    }
}

struct Waiter {
    seq: u64,
    tx: oneshot::Sender<ReceiveResponse>,
}

type PendingMap = DashMap<Uuid, Waiter>;

/// Correlation table for the send-then-await request pattern.
///
/// Each id has at most one pending waiter. The entry is removed exactly once,
/// by whichever of response, cancellation, or timeout resolves it first.
#[derive(Clone, Default)]
pub struct RequestManager {
    pending: Arc<PendingMap>,
    next_seq: Arc<AtomicU64>,
}

impl RequestManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `id`; fails if one is already pending.
    pub fn register(&self, id: Uuid) -> Result<PendingResponse> {
        match self.pending.entry(id) {
            Entry::Occupied(_) => Err(PayloadError::DuplicateRegistration(id)),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert(Waiter { seq, tx });
                Ok(PendingResponse {
                    id,
                    rx,
                    _guard: EntryGuard {
                        id,
                        seq,
                        pending: Arc::clone(&self.pending),
                    },
                })
            }
        }
    }

    /// Complete the waiter for `id`. Returns false if none is pending.
    pub fn signal(&self, id: Uuid, response: ReceiveResponse) -> bool {
        match self.pending.remove(&id) {
            Some((_, waiter)) => waiter.tx.send(response).is_ok(),
            None => {
                debug!(%id, "no pending request for response");
                false
            }
        }
    }

    /// Resolve the waiter for `id` as cancelled.
    pub fn cancel(&self, id: Uuid) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Resolve every pending waiter as cancelled.
    pub fn cancel_all(&self) {
        let count = self.pending.len();
        self.pending.clear();
        if count > 0 {
            debug!(count, "cancelled pending requests");
        }
    }

    pub fn is_pending(&self, id: Uuid) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Removes its entry on drop unless a newer registration took the id.
struct EntryGuard {
    id: Uuid,
    seq: u64,
    pending: Arc<PendingMap>,
}

impl Drop for EntryGuard {
    fn drop(&mut self) {
        self.pending
            .remove_if(&self.id, |_, waiter| waiter.seq == self.seq);
    }
}

/// Handle for one registered request.
///
/// Dropping it without waiting deregisters the id.
pub struct PendingResponse {
    id: Uuid,
    rx: oneshot::Receiver<ReceiveResponse>,
    _guard: EntryGuard,
}

impl PendingResponse {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the response or for `cancel` to fire.
    pub async fn wait(self, cancel: &CancellationToken) -> ResponseOutcome {
        self.wait_inner(cancel, None).await
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    pub async fn wait_timeout(
        self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ResponseOutcome {
        self.wait_inner(cancel, Some(timeout)).await
    }

    /// Block the current thread until the response arrives or the entry is cancelled.
    ///
    /// Must not be called from inside an async task.
    pub fn blocking_wait(self) -> ResponseOutcome {
        let PendingResponse { rx, _guard, .. } = self;
        match rx.blocking_recv() {
            Ok(response) => ResponseOutcome::Completed(response),
            Err(_) => ResponseOutcome::Cancelled,
        }
    }

    async fn wait_inner(
        self,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> ResponseOutcome {
        let PendingResponse { id, rx, _guard } = self;
        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        // A response that is already delivered wins over cancellation or deadline.
        let outcome = tokio::select! {
            biased;
            result = rx => match result {
                Ok(response) => ResponseOutcome::Completed(response),
                Err(_) => ResponseOutcome::Cancelled,
            },
            _ = cancel.cancelled() => ResponseOutcome::Cancelled,
            _ = deadline => ResponseOutcome::TimedOut,
        };
        if !matches!(outcome, ResponseOutcome::Completed(_)) {
            debug!(%id, ?outcome, "request abandoned");
        }
        outcome
    }
}
