//! Minimal in-process HTTP server for integration tests. Serves exactly one
//! request with a scripted response, writing the body in separate reads.

#![allow(dead_code)]

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const SSE_HEAD: &str =
    "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";

/// One scripted response: a head, then body pieces flushed one by one.
pub struct Script {
    pub head: String,
    pub chunks: Vec<Vec<u8>>,
    /// Keep the connection open this long after the last chunk.
    pub hold_open: Duration,
}

impl Script {
    pub fn sse(chunks: &[&str]) -> Self {
        Self {
            head: SSE_HEAD.to_string(),
            chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
            hold_open: Duration::ZERO,
        }
    }

    pub fn sse_bytes(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            head: SSE_HEAD.to_string(),
            chunks,
            hold_open: Duration::ZERO,
        }
    }

    pub fn json(body: &str) -> Self {
        Self {
            head: format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            ),
            chunks: vec![body.as_bytes().to_vec()],
            hold_open: Duration::ZERO,
        }
    }

    pub fn status(code: u16, reason: &str) -> Self {
        Self {
            head: format!(
                "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                code, reason
            ),
            chunks: Vec::new(),
            hold_open: Duration::ZERO,
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read one request; returns its body.
async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    loop {
        let n = stream.read(&mut tmp).await.unwrap();
        if n == 0 {
            return String::new();
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let body_start = end + 4;
            if buf.len() >= body_start + len {
                return String::from_utf8_lossy(&buf[body_start..body_start + len]).into_owned();
            }
        }
    }
}

/// Bind a free port and serve `script` to the first connection.
/// Returns the query URL and a handle yielding the request body.
pub async fn spawn_server(script: Script) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (mut tcp, _) = listener.accept().await.unwrap();
        let body = read_request(&mut tcp).await;
        tcp.write_all(script.head.as_bytes()).await.unwrap();
        tcp.flush().await.unwrap();
        for chunk in &script.chunks {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if tcp.write_all(chunk).await.is_err() {
                break;
            }
            let _ = tcp.flush().await;
        }
        tokio::time::sleep(script.hold_open).await;
        let _ = tcp.shutdown().await;
        body
    });
    (format!("http://127.0.0.1:{}/chat/query", port), handle)
}

/// Same as [`spawn_server`] on a dedicated thread and runtime, for tests that
/// drive a blocking child process.
pub fn spawn_server_thread(script: Script) -> (String, std::thread::JoinHandle<String>) {
    let (tx, rx) = std::sync::mpsc::channel();
    let handle = std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let (url, server) = spawn_server(script).await;
            tx.send(url).unwrap();
            server.await.unwrap()
        })
    });
    let url = rx.recv().unwrap();
    (url, handle)
}
