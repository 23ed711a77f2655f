use std::fs;
use std::time::Duration;

use botstream_payload::{ReceiveResponse, StreamingRequest};
use botstream_peer::{connect_with_config, PeerConfig};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cmd::SendArgs;
use crate::exit::{io_error, peer_error, CliError, CliResult, REQUEST_FAILED, SUCCESS, USAGE};
use crate::output::{print_response, OutputFormat, ResponseReport, StreamBody};

struct Body {
    content_type: String,
    data: Vec<u8>,
}

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let request = build_request(&args)?;

    let peer = connect_with_config(
        &args.socket,
        None,
        PeerConfig::default().with_request_timeout(Some(timeout)),
    )
    .await
    .map_err(|err| peer_error("connect failed", err))?;

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let request_id = Uuid::new_v4();
    let sent = peer
        .send_request_with_id(request_id, request, &cancel)
        .await;
    interrupt.abort();
    let response = sent.map_err(|err| peer_error("request failed", err))?;

    let success = response.is_success();
    let report = drain(request_id, response).await;
    print_response(&report, peer.id(), format);
    peer.disconnect();

    Ok(if success { SUCCESS } else { REQUEST_FAILED })
}

fn build_request(args: &SendArgs) -> CliResult<StreamingRequest> {
    let mut request = StreamingRequest::new(args.verb.to_ascii_uppercase(), args.path.clone());
    if let Some(body) = resolve_body(args)? {
        let content_type = args.content_type.clone().unwrap_or(body.content_type);
        request.set_body(Some(content_type), body.data);
    }
    Ok(request)
}

fn resolve_body(args: &SendArgs) -> CliResult<Option<Body>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(Some(Body {
            content_type: "application/json".to_string(),
            data: json.as_bytes().to_vec(),
        }));
    }
    if let Some(data) = &args.data {
        return Ok(Some(Body {
            content_type: "text/plain".to_string(),
            data: data.as_bytes().to_vec(),
        }));
    }
    if let Some(path) = &args.file {
        let data = fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        return Ok(Some(Body {
            content_type: "application/octet-stream".to_string(),
            data,
        }));
    }
    Ok(None)
}

async fn drain(request_id: Uuid, response: ReceiveResponse) -> ResponseReport {
    let mut streams = Vec::with_capacity(response.streams.len());
    for stream in &response.streams {
        streams.push(StreamBody {
            id: stream.id(),
            content_type: stream.content_type().map(str::to_string),
            body: stream.read_to_end().await,
        });
    }
    ResponseReport {
        request_id,
        status_code: response.status_code,
        streams,
    }
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
