use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Answer requests on a socket: version info on GET /api/version, echo otherwise.
    Serve(ServeArgs),
    /// Send a single request and print the response.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args).await,
        Command::Send(args) => send::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub socket: PathBuf,
    /// Maximum outgoing frame payload size in bytes.
    #[arg(long, env = "BOTSTREAM_MAX_PAYLOAD", default_value_t = botstream_frame::DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,
    /// Maximum unread bytes buffered per incoming stream.
    #[arg(long, env = "BOTSTREAM_STREAM_BUFFER_LIMIT", value_name = "BYTES")]
    pub stream_buffer_limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub socket: PathBuf,
    /// Request verb.
    #[arg(long, default_value = "GET")]
    pub verb: String,
    /// Request path.
    #[arg(long, default_value = "/")]
    pub path: String,
    /// JSON body.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string body.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read body from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Content type of the body; inferred from the body option when omitted.
    #[arg(long)]
    pub content_type: Option<String>,
    /// Maximum time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, env = "BOTSTREAM_TIMEOUT", default_value = "30s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
