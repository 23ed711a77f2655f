//! Two peers in one process exchanging a request with several attachments.
//!
//! The attachments are multiplexed over the same connection as the request
//! and the response, in frames no larger than the configured chunk size.
//!
//! Run with:
//!   cargo run --example attachments --features peer

use std::sync::Arc;

use botstream::frame::FrameConfig;
use botstream::payload::{OutgoingStream, ReceiveRequest, StreamingRequest, StreamingResponse};
use botstream::peer::{Peer, PeerConfig, RequestHandler};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (left, right) = tokio::io::duplex(64 * 1024);
    let config =
        PeerConfig::default().with_frame_config(FrameConfig::default().with_max_payload_size(512));

    let handler: Arc<dyn RequestHandler> =
        Arc::new(|_id: Uuid, request: ReceiveRequest| async move {
            let mut sizes = Vec::new();
            for stream in &request.streams {
                let body = stream.read_to_end().await;
                sizes.push((stream.content_type().unwrap_or("-").to_string(), body.len()));
            }
            let mut response = StreamingResponse::ok();
            if response.set_body_json(&sizes).is_err() {
                return StreamingResponse::internal_error();
            }
            response
        });

    let _server = Peer::from_stream("server", left, Some(handler), config.clone());
    let client = Peer::from_stream("client", right, None, config);

    let mut request = StreamingRequest::post("/api/attachments");
    request.add_stream(OutgoingStream::json(&serde_json::json!({"text": "see attached"}))?);
    request.add_stream(OutgoingStream::from_bytes(
        Some("application/octet-stream".into()),
        vec![0xAB; 10_000],
    ));
    request.add_stream(OutgoingStream::from_reader(
        Some("text/plain".into()),
        &b"streamed from a reader"[..],
        None,
    ));

    let response = client.send_request(request).await?;
    let sizes: Vec<(String, usize)> = response.read_body_json().await?;
    println!("status {}", response.status_code);
    for (content_type, size) in sizes {
        println!("  {content_type}: {size} bytes");
    }

    client.disconnect();
    Ok(())
}
