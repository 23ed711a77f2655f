use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use botstream_frame::{Frame, FrameError, FrameReader, FrameWriter, PayloadType};
use botstream_payload::{
    Disassembler, MessageAssembler, PayloadHandler, ReceiveRequest, ReceiveResponse,
    RequestManager, ResponseOutcome, StreamAssembler, StreamRegistry, StreamingRequest,
    StreamingResponse,
};
use futures_util::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PeerConfig;
use crate::error::{PeerError, Result};
use crate::handler::RequestHandler;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One multiplexed connection to a remote peer.
///
/// Owns the stream registry, message assembler and request correlation table
/// for the connection. Incoming frames are read by a background task, so a
/// `Peer` must be created inside a tokio runtime. Dropping it disconnects.
pub struct Peer {
    shared: Arc<PeerShared>,
}

struct PeerShared {
    id: String,
    config: PeerConfig,
    disassembler: Disassembler<BoxedWriter>,
    streams: StreamRegistry,
    assembler: MessageAssembler,
    requests: RequestManager,
    handler: Option<Arc<dyn RequestHandler>>,
    connected: AtomicBool,
    disconnect_reason: Mutex<Option<String>>,
    closed: CancellationToken,
}

/// Routes completed messages back into the owning peer.
struct Dispatch {
    peer: Weak<PeerShared>,
}

impl PayloadHandler for Dispatch {
    fn on_request_complete(&self, id: Uuid, request: ReceiveRequest) {
        let Some(shared) = self.peer.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let response = shared.respond(id, request).await;
            if let Err(err) = shared.disassembler.send_response(id, response).await {
                warn!(peer = %shared.id, %id, error = %err, "failed to send response");
            }
        });
    }

    fn on_response_complete(&self, id: Uuid, response: ReceiveResponse) {
        let Some(shared) = self.peer.upgrade() else {
            return;
        };
        if !shared.requests.signal(id, response) {
            debug!(peer = %shared.id, %id, "dropping unmatched response");
        }
    }
}

impl Peer {
    /// Wrap a duplex stream.
    pub fn from_stream<S>(
        id: impl Into<String>,
        stream: S,
        handler: Option<Arc<dyn RequestHandler>>,
        config: PeerConfig,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_parts(id, Box::new(reader), Box::new(writer), handler, config)
    }

    /// Build a peer from separate read and write halves.
    pub fn from_parts(
        id: impl Into<String>,
        reader: BoxedReader,
        writer: BoxedWriter,
        handler: Option<Arc<dyn RequestHandler>>,
        config: PeerConfig,
    ) -> Self {
        let id = id.into();
        let writer = Arc::new(FrameWriter::with_config(writer, config.frame.clone()));
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let streams = StreamRegistry::builder()
            .buffer_limit(config.stream_buffer_limit)
            .cancel_handler(move |assembler: &StreamAssembler| {
                // The peer may already be gone; nothing left to notify then.
                let _ = control_tx.send(assembler.id());
            })
            .build();

        let shared = Arc::new_cyclic(|weak: &Weak<PeerShared>| PeerShared {
            id,
            disassembler: Disassembler::new(Arc::clone(&writer)),
            assembler: MessageAssembler::new(
                streams.clone(),
                Arc::new(Dispatch { peer: weak.clone() }),
            ),
            streams,
            requests: RequestManager::new(),
            handler,
            connected: AtomicBool::new(true),
            disconnect_reason: Mutex::new(None),
            closed: CancellationToken::new(),
            config,
        });

        let frame_reader = FrameReader::with_config(reader, &shared.config.frame);
        tokio::spawn(receive_loop(Arc::clone(&shared), frame_reader));
        tokio::spawn(control_loop(
            shared.id.clone(),
            writer,
            control_rx,
            shared.closed.clone(),
        ));

        debug!(peer = %shared.id, "peer started");
        Self { shared }
    }

    /// Peer identifier.
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn config(&self) -> &PeerConfig {
        &self.shared.config
    }

    /// Whether the connection is still up.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Why the peer disconnected, once it has.
    pub fn disconnect_reason(&self) -> Option<String> {
        self.shared
            .disconnect_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.requests.pending_count()
    }

    /// Outgoing messages and streams still being sent.
    pub fn active_sends(&self) -> usize {
        self.shared.disassembler.active_count()
    }

    /// Send a request and wait for its response.
    pub async fn send_request(&self, request: StreamingRequest) -> Result<ReceiveResponse> {
        self.send_request_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`send_request`](Self::send_request), also giving up when `cancel` fires.
    ///
    /// Cancelling abandons the local wait and stops any attachments still being
    /// sent. Use [`cancel_all`](Self::cancel_all) to tell the remote side.
    pub async fn send_request_with_cancel(
        &self,
        request: StreamingRequest,
        cancel: &CancellationToken,
    ) -> Result<ReceiveResponse> {
        self.send_request_with_id(Uuid::new_v4(), request, cancel)
            .await
    }

    /// Send a request under a caller-chosen correlation id.
    pub async fn send_request_with_id(
        &self,
        id: Uuid,
        request: StreamingRequest,
        cancel: &CancellationToken,
    ) -> Result<ReceiveResponse> {
        self.ensure_connected()?;
        let shared = &self.shared;
        let pending = shared.requests.register(id)?;
        debug!(peer = %shared.id, %id, verb = %request.verb, path = %request.path, "sending request");

        let timeout = shared.config.request_timeout;
        let waiting = async move {
            match timeout {
                Some(timeout) => pending.wait_timeout(timeout, cancel).await,
                None => pending.wait(cancel).await,
            }
        };
        tokio::pin!(waiting);

        // The send runs on its own task so an early outcome never drops it in
        // the middle of a frame. It stops only at frame boundaries.
        let mut sending = {
            let shared = Arc::clone(shared);
            tokio::spawn(async move { shared.disassembler.send_request(id, request).await })
        };

        // The response may arrive before every attached stream is sent.
        let early = tokio::select! {
            sent = &mut sending => {
                sent.map_err(|err| {
                    PeerError::Disconnected(format!("request send task failed: {err}"))
                })??;
                None
            }
            outcome = &mut waiting => Some(outcome),
        };
        let outcome = match early {
            Some(outcome) => outcome,
            None => waiting.await,
        };

        if !matches!(outcome, ResponseOutcome::Completed(_)) && shared.disassembler.abort(id) {
            debug!(peer = %shared.id, %id, "stopped outgoing request streams");
        }

        match outcome {
            ResponseOutcome::Completed(response) => Ok(response),
            ResponseOutcome::TimedOut => Err(PeerError::Timeout(
                timeout.unwrap_or_default(),
            )),
            ResponseOutcome::Cancelled if !self.is_connected() => {
                Err(PeerError::Disconnected(self.reason_or_default()))
            }
            ResponseOutcome::Cancelled => Err(PeerError::Cancelled),
        }
    }

    /// Ask the remote side to stop every stream of message `id`.
    pub async fn cancel_all(&self, id: Uuid) -> Result<()> {
        self.ensure_connected()?;
        self.shared.disassembler.send_cancel_all(id).await?;
        Ok(())
    }

    /// Ask the remote side to stop sending stream `id`.
    pub async fn cancel_stream(&self, id: Uuid) -> Result<()> {
        self.ensure_connected()?;
        self.shared.disassembler.send_cancel_stream(id).await?;
        Ok(())
    }

    /// Tear the connection down locally.
    pub fn disconnect(&self) {
        self.shared.teardown("disconnected locally");
    }

    /// Resolves once the connection is gone.
    pub async fn closed(&self) {
        self.shared.closed.cancelled().await;
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(PeerError::Disconnected(self.reason_or_default()))
        }
    }

    fn reason_or_default(&self) -> String {
        self.disconnect_reason()
            .unwrap_or_else(|| "connection closed".to_string())
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        self.shared.teardown("peer dropped");
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.shared.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl PeerShared {
    async fn respond(&self, id: Uuid, request: ReceiveRequest) -> StreamingResponse {
        let Some(handler) = &self.handler else {
            debug!(peer = %self.id, %id, path = %request.path, "no request handler");
            return StreamingResponse::not_found();
        };
        match AssertUnwindSafe(handler.process_request(id, request))
            .catch_unwind()
            .await
        {
            Ok(response) => response,
            Err(_) => {
                error!(peer = %self.id, %id, "request handler panicked");
                StreamingResponse::internal_error()
            }
        }
    }

    /// Cancel everything tied to the connection. Only the first call acts.
    fn teardown(&self, reason: &str) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        *self
            .disconnect_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason.to_string());
        info!(peer = %self.id, reason, "peer disconnected");

        self.disassembler.abort_all();
        self.streams.cancel_all();
        self.assembler.cancel_all();
        self.requests.cancel_all();
        self.closed.cancel();
    }

    fn dispatch(&self, frame: Frame) {
        let Frame { header, payload } = frame;
        match header.payload_type {
            PayloadType::Request | PayloadType::Response => {
                if let Err(err) = self.assembler.on_receive(&header, payload) {
                    warn!(peer = %self.id, id = %header.id, error = %err, "dropping message");
                }
            }
            PayloadType::Stream => {
                if let Err(err) = self.streams.on_receive(&header, payload) {
                    warn!(peer = %self.id, id = %header.id, error = %err, "stream aborted");
                }
            }
            PayloadType::CancelAll | PayloadType::CancelStream => {
                if self.disassembler.abort(header.id) {
                    debug!(peer = %self.id, id = %header.id, kind = %header.payload_type, "outgoing send cancelled by peer");
                } else {
                    debug!(peer = %self.id, id = %header.id, kind = %header.payload_type, "cancel for untracked id");
                }
            }
        }
    }
}

async fn receive_loop(shared: Arc<PeerShared>, mut reader: FrameReader<BoxedReader>) {
    let reason = loop {
        let frame = tokio::select! {
            _ = shared.closed.cancelled() => break None,
            frame = reader.read_frame() => frame,
        };
        match frame {
            Ok(frame) => shared.dispatch(frame),
            Err(FrameError::ConnectionClosed) => break Some("connection closed by peer".to_string()),
            Err(err) if err.is_framing() => {
                error!(peer = %shared.id, error = %err, "malformed frame; dropping connection");
                break Some(format!("framing error: {err}"));
            }
            Err(err) => {
                error!(peer = %shared.id, error = %err, "read failed");
                break Some(format!("read error: {err}"));
            }
        }
    };

    if let Some(reason) = reason {
        shared.teardown(&reason);
    }
    if let Err(err) = shared.disassembler.writer().shutdown().await {
        debug!(peer = %shared.id, error = %err, "shutdown after disconnect failed");
    }
}

async fn control_loop(
    peer: String,
    writer: Arc<FrameWriter<BoxedWriter>>,
    mut queue: mpsc::UnboundedReceiver<Uuid>,
    closed: CancellationToken,
) {
    loop {
        let id = tokio::select! {
            _ = closed.cancelled() => return,
            id = queue.recv() => match id {
                Some(id) => id,
                None => return,
            },
        };
        debug!(%peer, stream = %id, "asking peer to cancel stream");
        if let Err(err) = writer
            .write_frame(&Frame::empty(PayloadType::CancelStream, id))
            .await
        {
            debug!(%peer, error = %err, "cancel frame not sent");
            return;
        }
    }
}
