//! Shared HTTP fixtures for transport-level tests
//!
//! A tiny hand-rolled HTTP/1.1 server over [`tokio::net::TcpListener`]:
//! enough to hand a canned event-stream body to `reqwest` and capture what
//! the client sent. `Connection: close` on every response keeps one TCP
//! accept per logical request, which the reconnect tests rely on.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    /// Header names lowercased.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct FixtureResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl FixtureResponse {
    pub fn ok(body: String) -> Self {
        Self::status(200, "OK", body)
    }

    pub fn status(status: u16, reason: &str, body: String) -> Self {
        Self {
            status,
            reason: reason.to_string(),
            body,
        }
    }
}

pub struct StreamFixture {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    accepts: Arc<Mutex<Vec<Instant>>>,
}

impl StreamFixture {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().expect("fixture requests lock").clone()
    }

    pub fn accept_instants(&self) -> Vec<Instant> {
        self.accepts.lock().expect("fixture accepts lock").clone()
    }
}

/// Frame each JSON payload as a `data:` event and join with blank lines.
pub fn sse_body(payloads: &[&str]) -> String {
    payloads
        .iter()
        .map(|payload| format!("data: {payload}\n\n"))
        .collect()
}

/// Serve the given responses, one TCP connection each, then stop
/// accepting. Extra connection attempts block in accept, which tests use
/// to assert that no further attempt was made.
pub async fn serve_responses(responses: Vec<FixtureResponse>) -> StreamFixture {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("fixture listener should bind");
    let addr = listener.local_addr().expect("fixture local addr");
    let requests: Arc<Mutex<Vec<CapturedRequest>>> = Arc::new(Mutex::new(Vec::new()));
    let accepts: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));

    let requests_for_server = Arc::clone(&requests);
    let accepts_for_server = Arc::clone(&accepts);
    tokio::spawn(async move {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            accepts_for_server
                .lock()
                .expect("fixture accepts lock")
                .push(Instant::now());

            match read_http_request(&mut stream).await {
                Ok(request) => {
                    requests_for_server
                        .lock()
                        .expect("fixture requests lock")
                        .push(request);
                }
                Err(err) => {
                    eprintln!("fixture failed to read request: {err}");
                    continue;
                }
            }

            let payload = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                response.status,
                response.reason,
                response.body.len(),
                response.body
            );
            if let Err(err) = stream.write_all(payload.as_bytes()).await {
                eprintln!("fixture failed to write response: {err}");
            }
            let _ = stream.shutdown().await;
        }
    });

    StreamFixture {
        addr,
        requests,
        accepts,
    }
}

async fn read_http_request(
    stream: &mut tokio::net::TcpStream,
) -> Result<CapturedRequest, String> {
    let mut raw = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        if let Some(pos) = find_header_end(&raw) {
            break pos;
        }
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("connection closed before headers completed".to_string());
        }
        raw.extend_from_slice(&chunk[..read]);
    };

    let head = std::str::from_utf8(&raw[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or("missing request line")?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or("missing method")?.to_string();
    let path = parts.next().ok_or("missing path")?.to_string();

    let mut headers = Vec::new();
    let mut content_length = 0usize;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim().to_string();
            if name == "content-length" {
                content_length = value.parse().unwrap_or(0);
            }
            headers.push((name, value));
        }
    }

    let mut body = raw[header_end + 4..].to_vec();
    while body.len() < content_length {
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("connection closed before body completed".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    memchr::memmem::find(raw, b"\r\n\r\n")
}
