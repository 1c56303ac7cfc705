//! Integration tests for the `playcoach serve` HTTP API.
//!
//! Each test starts the server as a child process on a unique port with its
//! own data directory, makes raw HTTP requests, and verifies the responses.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

/// Atomic port counter to avoid port conflicts between parallel tests.
/// Base port is derived from process ID so separate test binaries don't
/// collide on the same port range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

const TOKEN: &str = "test-token";
const USER: &str = "player-1";

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 20000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

/// A running server; killed on drop.
struct Server {
    port: u16,
    child: Child,
    _data_dir: tempfile::TempDir,
}

impl Drop for Server {
    fn drop(&mut self) {
        self.child.kill().ok();
        self.child.wait().ok();
    }
}

/// Helper: start `playcoach serve` with a fresh data directory.
///
/// `gemini_url` points the generation client at a fake service; when
/// `None`, no API key is configured.
fn start_server(gemini_url: Option<&str>) -> Server {
    let port = next_port();
    let data_dir = tempfile::tempdir().expect("tempdir");

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_playcoach"));
    cmd.arg("serve").arg("--port").arg(port.to_string());
    cmd.env("PLAYCOACH_DATA_DIR", data_dir.path());
    cmd.env("PLAYCOACH_TOKENS", format!("{TOKEN}={USER}"));
    cmd.env("PLAYCOACH_PUBLIC_URL", format!("http://127.0.0.1:{port}/files"));
    cmd.env("PLAYCOACH_TIMEOUT_SECS", "5");
    match gemini_url {
        Some(url) => {
            cmd.env("PLAYCOACH_GEMINI_URL", url);
            cmd.env("GEMINI_API_KEY", "fake-key");
        }
        None => {
            cmd.env_remove("GEMINI_API_KEY");
        }
    }
    // Redirect stdout/stderr to avoid blocking
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    let child = cmd.spawn().expect("failed to start playcoach serve");
    let server = Server {
        port,
        child,
        _data_dir: data_dir,
    };
    // Wait for server to be ready by polling the port
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            return server;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    server
}

/// Helper: a fake generation service answering every request with `text`
/// wrapped in a one-candidate envelope. Returns its base URL.
fn fake_gemini(text: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake gemini");
    let base = format!("http://{}", listener.local_addr().unwrap());
    let body = serde_json::json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
    .to_string();

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            read_http_request(&mut stream);
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    base
}

/// Read one request (headers plus a Content-Length or chunked body).
fn read_http_request(stream: &mut TcpStream) {
    stream.set_read_timeout(Some(Duration::from_secs(5))).ok();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let headers = text[..end].to_ascii_lowercase();
            if headers.contains("transfer-encoding: chunked") {
                if text.ends_with("0\r\n\r\n") {
                    return;
                }
                continue;
            }
            let length = extract_header(&headers, "content-length")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return;
            }
        }
    }
}

/// Helper: send one request and return (status, body).
fn http_request(
    port: u16,
    method: &str,
    path: &str,
    extra_headers: &[(&str, &str)],
    body: &[u8],
) -> (u16, String) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();

    let mut header_lines = String::new();
    for (name, value) in extra_headers {
        header_lines.push_str(&format!("{}: {}\r\n", name, value));
    }
    let head = format!(
        "{} {} HTTP/1.1\r\nHost: localhost:{}\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n",
        method,
        path,
        port,
        header_lines,
        body.len()
    );
    stream.write_all(head.as_bytes()).expect("failed to write");
    stream.write_all(body).expect("failed to write body");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);

    parse_http_response(&response)
}

fn http_get(port: u16, path: &str, token: Option<&str>) -> (u16, String) {
    let auth = token.map(|t| format!("Bearer {t}"));
    let headers: Vec<(&str, &str)> = auth
        .as_deref()
        .map(|a| vec![("Authorization", a)])
        .unwrap_or_default();
    http_request(port, "GET", path, &headers, b"")
}

fn post_json(port: u16, path: &str, body: &str) -> (u16, String) {
    let auth = format!("Bearer {TOKEN}");
    http_request(
        port,
        "POST",
        path,
        &[("Authorization", &auth), ("Content-Type", "application/json")],
        body.as_bytes(),
    )
}

const BOUNDARY: &str = "playcoach-test-boundary";

fn multipart_body(field: &str, file_name: &str, content: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: text/plain\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn post_upload(port: u16, body: &[u8]) -> (u16, String) {
    let auth = format!("Bearer {TOKEN}");
    let content_type = format!("multipart/form-data; boundary={BOUNDARY}");
    http_request(
        port,
        "POST",
        "/upload-gameplay",
        &[("Authorization", &auth), ("Content-Type", &content_type)],
        body,
    )
}

/// Extract a header value from raw headers string.
fn extract_header<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    let name_lower = name.to_lowercase();
    for line in headers.lines() {
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().to_lowercase() == name_lower {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Parse an HTTP response into (status_code, body).
fn parse_http_response(response: &str) -> (u16, String) {
    let parts: Vec<&str> = response.splitn(2, "\r\n\r\n").collect();
    let headers = parts.first().unwrap_or(&"").to_string();
    let body = parts.get(1).unwrap_or(&"").to_string();

    let status_line = headers.lines().next().unwrap_or("");
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);

    let chunked = extract_header(&headers, "transfer-encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);
    let body = if chunked { decode_chunked(&body) } else { body };

    (status, body)
}

/// Decode chunked transfer encoding.
fn decode_chunked(data: &str) -> String {
    let mut result = String::new();
    let mut remaining = data;

    while let Some(line_end) = remaining.find("\r\n") {
        let size = match usize::from_str_radix(remaining[..line_end].trim(), 16) {
            Ok(s) => s,
            Err(_) => break,
        };
        if size == 0 {
            break;
        }
        let chunk_start = line_end + 2;
        let chunk_end = chunk_start + size;
        if chunk_end > remaining.len() {
            result.push_str(&remaining[chunk_start..]);
            break;
        }
        result.push_str(&remaining[chunk_start..chunk_end]);
        remaining = remaining.get(chunk_end + 2..).unwrap_or("");
    }

    result
}

fn json(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("invalid JSON ({e}): {body}"))
}

#[test]
fn health_is_public() {
    let server = start_server(None);
    let (status, body) = http_get(server.port, "/health", None);
    assert_eq!(status, 200);
    assert_eq!(json(&body)["status"], "ok");
}

#[test]
fn missing_or_unknown_token_is_401() {
    let server = start_server(None);

    let (status, body) = http_get(server.port, "/gameplay-logs", None);
    assert_eq!(status, 401);
    assert_eq!(json(&body)["error"], "Authentication required.");

    let (status, _) = http_get(server.port, "/gameplay-logs", Some("wrong"));
    assert_eq!(status, 401);
}

#[test]
fn empty_text_is_400() {
    let server = start_server(None);
    let (status, body) = post_json(server.port, "/analyze-gameplay", r#"{"gameplayText":"   "}"#);
    assert_eq!(status, 400);
    assert_eq!(json(&body)["error"], "Gameplay text is required for analysis.");

    let (status, _) = post_json(server.port, "/analyze-gameplay", "{}");
    assert_eq!(status, 400);
}

#[test]
fn missing_api_key_is_500_and_writes_nothing() {
    let server = start_server(None);
    let (status, body) = post_json(
        server.port,
        "/analyze-gameplay",
        r#"{"gameplayText":"died twice to the same flank route"}"#,
    );
    assert_eq!(status, 500);
    let body = json(&body);
    assert!(body["error"].as_str().unwrap().contains("configuration"));
    assert_eq!(body["details"], "GEMINI_API_KEY is not set");

    let (status, body) = http_get(server.port, "/gameplay-logs", Some(TOKEN));
    assert_eq!(status, 200);
    assert_eq!(json(&body)["logs"].as_array().unwrap().len(), 0);
}

#[test]
fn analysis_round_trip_through_fake_service() {
    let gemini = fake_gemini(
        r#"{"analysis":"Positioning weakness identified.","suggestions":["Rotate vision to flank earlier"],"errorsDetected":["Repeated death to identical angle"]}"#,
    );
    let server = start_server(Some(&gemini));

    let (status, body) = post_json(
        server.port,
        "/analyze-gameplay",
        r#"{"gameplayText":"died twice to the same flank route"}"#,
    );
    assert_eq!(status, 200, "{body}");
    assert_eq!(
        json(&body),
        serde_json::json!({
            "analysis": "Positioning weakness identified.",
            "suggestions": ["Rotate vision to flank earlier"],
            "errorsDetected": ["Repeated death to identical angle"]
        })
    );

    let (_, body) = http_get(server.port, "/gameplay-logs", Some(TOKEN));
    let logs = json(&body)["logs"].as_array().unwrap().clone();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["ownerId"], USER);
    assert_eq!(logs[0]["sourceText"], "died twice to the same flank route");
    assert_eq!(logs[0]["result"]["analysis"], "Positioning weakness identified.");
}

#[test]
fn unparseable_model_output_is_degraded_200() {
    let gemini = fake_gemini("Nice game! You did great.");
    let server = start_server(Some(&gemini));

    let (status, body) = post_json(server.port, "/analyze-gameplay", r#"{"gameplayText":"gg"}"#);
    assert_eq!(status, 200);
    let body = json(&body);
    assert_eq!(body["suggestions"].as_array().unwrap().len(), 0);
    assert_eq!(body["errorsDetected"].as_array().unwrap().len(), 1);

    let (_, logs) = http_get(server.port, "/gameplay-logs", Some(TOKEN));
    assert_eq!(json(&logs)["logs"].as_array().unwrap().len(), 1);
}

#[test]
fn upload_stores_file_and_record() {
    let server = start_server(None);
    let (status, body) = post_upload(
        server.port,
        &multipart_body("gameplayFile", "round 1.log", b"died at B site"),
    );
    assert_eq!(status, 200, "{body}");
    let body = json(&body);
    assert_eq!(body["message"], "File uploaded and metadata saved.");
    let file_url = body["fileUrl"].as_str().unwrap().to_string();
    assert!(file_url.ends_with("_round_1.log"), "{file_url}");

    let path = file_url
        .strip_prefix(&format!("http://127.0.0.1:{}", server.port))
        .expect("public URL points at this server");
    let (status, content) = http_get(server.port, path, None);
    assert_eq!(status, 200);
    assert_eq!(content, "died at B site");

    let (_, logs) = http_get(server.port, "/gameplay-logs", Some(TOKEN));
    let logs = json(&logs)["logs"].as_array().unwrap().clone();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["sourceFileName"], "round 1.log");
    assert_eq!(logs[0]["sourceFileUrl"], file_url.as_str());
    assert!(logs[0].get("result").is_none());
}

#[test]
fn upload_without_file_is_400() {
    let server = start_server(None);

    let (status, body) = post_upload(server.port, &multipart_body("otherField", "a.log", b"x"));
    assert_eq!(status, 400);
    assert_eq!(json(&body)["error"], "No file uploaded.");

    let (status, _) = post_upload(server.port, &multipart_body("gameplayFile", "empty.log", b""));
    assert_eq!(status, 400);
}

#[test]
fn history_stream_sends_snapshot_then_update() {
    let server = start_server(None);

    let mut stream =
        TcpStream::connect(format!("127.0.0.1:{}", server.port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    let request = format!(
        "GET /gameplay-logs/stream HTTP/1.1\r\nHost: localhost\r\nAuthorization: Bearer {TOKEN}\r\nAccept: text/event-stream\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).unwrap();

    let mut received = String::new();
    let mut read_until = |needle: &str, received: &mut String| {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut buf = [0u8; 4096];
        while !received.contains(needle) && Instant::now() < deadline {
            if let Ok(n) = stream.read(&mut buf) {
                if n == 0 {
                    break;
                }
                received.push_str(&String::from_utf8_lossy(&buf[..n]));
            }
        }
        received.contains(needle)
    };

    assert!(read_until("event: snapshot", &mut received), "{received}");

    let (status, _) = post_upload(
        server.port,
        &multipart_body("gameplayFile", "live.log", b"ace"),
    );
    assert_eq!(status, 200);

    assert!(read_until("event: update", &mut received), "{received}");
    assert!(received.contains("live.log"));
}

#[test]
fn unknown_route_is_json_404() {
    let server = start_server(None);
    let (status, body) = http_get(server.port, "/nope", Some(TOKEN));
    assert_eq!(status, 404);
    assert_eq!(json(&body)["error"], "not found");
}

#[test]
fn unknown_route_without_token_is_404_not_401() {
    let server = start_server(None);
    let (status, body) = http_get(server.port, "/nope", None);
    assert_eq!(status, 404);
    assert_eq!(json(&body)["error"], "not found");

    let (status, _) = http_get(server.port, "/gameplay-logs", None);
    assert_eq!(status, 401);
}
