//! Minimal echo server: accepts peers and answers every request with its own body.
//!
//! Run with:
//!   cargo run --example echo-server --features peer
//!
//! In another terminal:
//!   cargo run --features cli -- send /tmp/botstream-echo-<pid>/echo.sock \
//!     --verb POST --path /api/messages --json '{"hello":"world"}'

use std::fs;
use std::sync::Arc;

use botstream::payload::{OutgoingStream, ReceiveRequest, StreamingResponse};
use botstream::peer::{PeerListener, RequestHandler};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("botstream-echo-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("echo.sock");

    let handler: Arc<dyn RequestHandler> =
        Arc::new(|id: Uuid, request: ReceiveRequest| async move {
            eprintln!("{id}: {} {} ({} streams)", request.verb, request.path, request.streams.len());
            let mut response = StreamingResponse::ok();
            for stream in &request.streams {
                let body = stream.read_to_end().await;
                response.add_stream(OutgoingStream::from_bytes(
                    stream.content_type().map(str::to_string),
                    body,
                ));
            }
            response
        });

    let listener = PeerListener::bind(&sock_path)?.with_handler(handler);
    eprintln!("Listening on {}", sock_path.display());

    // Accept one peer and serve it until it disconnects.
    let peer = listener.accept().await?;
    eprintln!("Peer connected: {}", peer.id());
    peer.closed().await;
    eprintln!(
        "Peer disconnected: {}",
        peer.disconnect_reason().unwrap_or_default()
    );

    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
