use std::sync::Arc;

use botstream_frame::FrameConfig;
use botstream_payload::{verb, OutgoingStream, ReceiveRequest, StreamingResponse};
use botstream_peer::{PeerConfig, PeerListener, RequestHandler};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cmd::ServeArgs;
use crate::exit::{peer_error, CliResult, SUCCESS};

pub const VERSION_PATH: &str = "/api/version";

#[derive(Serialize)]
struct VersionBody {
    name: &'static str,
    version: &'static str,
}

/// GET /api/version reports the build; everything else is echoed back.
pub async fn handle(id: Uuid, request: ReceiveRequest) -> StreamingResponse {
    info!(
        %id,
        verb = %request.verb,
        path = %request.path,
        streams = request.streams.len(),
        "request"
    );

    if request.verb == verb::GET && request.path == VERSION_PATH {
        let mut response = StreamingResponse::ok();
        let body = VersionBody {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        };
        if let Err(err) = response.set_body_json(&body) {
            warn!(%id, error = %err, "failed to encode version body");
            return StreamingResponse::internal_error();
        }
        return response;
    }

    let mut response = StreamingResponse::ok();
    for stream in &request.streams {
        let body = stream.read_to_end().await;
        response.add_stream(OutgoingStream::from_bytes(
            stream.content_type().map(str::to_string),
            body,
        ));
    }
    response
}

pub async fn run(args: ServeArgs) -> CliResult<i32> {
    let handler: Arc<dyn RequestHandler> = Arc::new(handle);
    let config = PeerConfig::default()
        .with_frame_config(FrameConfig::default().with_max_payload_size(args.max_payload))
        .with_stream_buffer_limit(args.stream_buffer_limit);

    let listener = PeerListener::bind(&args.socket)
        .map_err(|err| peer_error("bind failed", err))?
        .with_handler(handler)
        .with_peer_config(config);
    info!(socket = %args.socket.display(), "serving");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let peer = accepted.map_err(|err| peer_error("accept failed", err))?;
                info!(peer = peer.id(), "peer connected");
                tokio::spawn(async move {
                    peer.closed().await;
                    info!(
                        peer = peer.id(),
                        reason = peer.disconnect_reason().as_deref().unwrap_or("closed"),
                        "peer disconnected"
                    );
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    Ok(SUCCESS)
}
