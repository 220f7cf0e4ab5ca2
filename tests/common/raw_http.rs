//! Minimal HTTP/1.1 over a bare socket, for tests that need to misbehave
//! at the connection level in ways reqwest will not.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.unwrap()
}

pub fn experiment_request(user_id: &str) -> Vec<u8> {
    let body = format!(r#"{{"userId":"{user_id}"}}"#);
    format!(
        "POST /experiment HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
    .into_bytes()
}

pub fn health_request() -> &'static [u8] {
    b"GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n"
}

pub async fn send(stream: &mut TcpStream, bytes: &[u8]) {
    stream.write_all(bytes).await.unwrap();
}

/// Read one complete response (headers plus `Content-Length` body) and
/// return its status code and body.
pub async fn read_response(stream: &mut TcpStream) -> (u16, Vec<u8>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before headers were complete");
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let status: u16 = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap();
    let content_length: usize = head
        .lines()
        .find_map(|l| {
            let (k, v) = l.split_once(':')?;
            k.eq_ignore_ascii_case("content-length")
                .then(|| v.trim().parse().ok())
                .flatten()
        })
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed mid body");
        body.extend_from_slice(&chunk[..n]);
    }
    (status, body)
}

/// Read until the peer closes or `limit` elapses. Returns the bytes read
/// and whether the connection was closed.
pub async fn drain_until_closed(stream: &mut TcpStream, limit: Duration) -> (usize, bool) {
    let mut total = 0;
    let mut chunk = vec![0u8; 64 * 1024];
    let outcome = tokio::time::timeout(limit, async {
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => total += n,
            }
        }
    })
    .await;
    (total, outcome.is_ok())
}
