#![cfg(all(unix, feature = "cli"))]

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "botstream-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    loop {
        if UnixStream::connect(path).is_ok() {
            return;
        }
        if start.elapsed() >= timeout {
            panic!("server did not come up at {}", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

struct Server {
    child: Child,
    dir: PathBuf,
    socket: PathBuf,
}

impl Server {
    fn start(tag: &str) -> Self {
        let dir = unique_temp_dir(tag);
        let socket = dir.join("serve.sock");
        let child = Command::new(env!("CARGO_BIN_EXE_botstream"))
            .args(["--log-level", "error", "serve"])
            .arg(&socket)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("serve should start");
        wait_for_socket(&socket, Duration::from_secs(5));
        Self { child, dir, socket }
    }

    fn send(&self, extra: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_botstream"))
            .args(["--log-level", "error", "--format", "json", "send"])
            .arg(&self.socket)
            .args(extra)
            .output()
            .expect("send should run")
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn parse_stdout(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be a JSON document")
}

#[test]
fn version_endpoint_over_socket() {
    let server = Server::start("version");
    let output = server.send(&["--path", "/api/version"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report = parse_stdout(&output);
    assert_eq!(report["status_code"], 200);
    let body: serde_json::Value =
        serde_json::from_str(report["streams"][0]["body"].as_str().unwrap()).unwrap();
    assert_eq!(body["name"], "botstream");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn post_body_is_echoed() {
    let server = Server::start("echo");
    let output = server.send(&[
        "--verb",
        "POST",
        "--path",
        "/api/messages",
        "--data",
        "hello over the wire",
        "--content-type",
        "text/plain",
    ]);
    assert!(output.status.success());

    let report = parse_stdout(&output);
    assert_eq!(report["status_code"], 200);
    assert_eq!(report["streams"][0]["content_type"], "text/plain");
    assert_eq!(report["streams"][0]["body"], "hello over the wire");
}

#[test]
fn raw_format_prints_only_the_body() {
    let server = Server::start("raw");
    let output = Command::new(env!("CARGO_BIN_EXE_botstream"))
        .args(["--log-level", "error", "--format", "raw", "send"])
        .arg(&server.socket)
        .args(["--verb", "PUT", "--json", "{\"n\":1}"])
        .output()
        .expect("send should run");
    assert!(output.status.success());
    assert_eq!(output.stdout, b"{\"n\":1}");
}

#[test]
fn send_to_missing_socket_fails() {
    let dir = unique_temp_dir("missing");
    let output = Command::new(env!("CARGO_BIN_EXE_botstream"))
        .args(["--log-level", "error", "send"])
        .arg(dir.join("absent.sock"))
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn invalid_json_is_usage_error() {
    let dir = unique_temp_dir("badjson");
    let output = Command::new(env!("CARGO_BIN_EXE_botstream"))
        .args(["--log-level", "error", "send"])
        .arg(dir.join("absent.sock"))
        .args(["--json", "{nope"])
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(64));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_botstream"))
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("botstream {}", env!("CARGO_PKG_VERSION"))
    );

    let extended = Command::new(env!("CARGO_BIN_EXE_botstream"))
        .args(["version", "--extended"])
        .output()
        .expect("version should run");
    let text = String::from_utf8_lossy(&extended.stdout);
    assert!(text.contains("header=48"));
    assert!(text.contains("default_chunk=4096"));
}
