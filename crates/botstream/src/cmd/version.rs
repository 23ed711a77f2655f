use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("botstream {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: botstream");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", option_env!("BOTSTREAM_BUILD_TARGET").unwrap_or("unknown"));
    println!("profile: {}", option_env!("BOTSTREAM_BUILD_PROFILE").unwrap_or("unknown"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "frame: header={} default_chunk={} max_payload={}",
        botstream_frame::HEADER_SIZE,
        botstream_frame::DEFAULT_MAX_PAYLOAD,
        botstream_frame::MAX_PAYLOAD_LENGTH
    );
    println!("features: peer={}, cli=true", cfg!(feature = "peer"));

    Ok(SUCCESS)
}
