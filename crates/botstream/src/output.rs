use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A fully drained response stream.
pub struct StreamBody {
    pub id: Uuid,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// A response with every stream read to the end.
pub struct ResponseReport {
    pub request_id: Uuid,
    pub status_code: u16,
    pub streams: Vec<StreamBody>,
}

#[derive(Serialize)]
struct StreamOutput<'a> {
    id: Uuid,
    content_type: Option<&'a str>,
    size: usize,
    body: String,
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    request_id: Uuid,
    status_code: u16,
    peer_id: &'a str,
    streams: Vec<StreamOutput<'a>>,
    timestamp: String,
}

pub fn print_response(report: &ResponseReport, peer_id: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ResponseOutput {
                request_id: report.request_id,
                status_code: report.status_code,
                peer_id,
                streams: report
                    .streams
                    .iter()
                    .map(|s| StreamOutput {
                        id: s.id,
                        content_type: s.content_type.as_deref(),
                        size: s.body.len(),
                        body: body_preview(&s.body),
                    })
                    .collect(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["STATUS", "STREAM", "TYPE", "SIZE", "BODY"]);
            if report.streams.is_empty() {
                table.add_row(vec![
                    report.status_code.to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "0".to_string(),
                    String::new(),
                ]);
            }
            for stream in &report.streams {
                table.add_row(vec![
                    report.status_code.to_string(),
                    stream.id.to_string(),
                    stream.content_type.clone().unwrap_or_else(|| "-".to_string()),
                    stream.body.len().to_string(),
                    body_preview(&stream.body),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "status={} request={} peer={} streams={}",
                report.status_code,
                report.request_id,
                peer_id,
                report.streams.len()
            );
            for stream in &report.streams {
                println!(
                    "  stream={} type={} size={} body={}",
                    stream.id,
                    stream.content_type.as_deref().unwrap_or("-"),
                    stream.body.len(),
                    body_preview(&stream.body)
                );
            }
        }
        OutputFormat::Raw => {
            for stream in &report.streams {
                print_raw(&stream.body);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn body_preview(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", body.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
