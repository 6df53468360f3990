//! Minimal in-process HTTP/1.1 answering service for integration tests.
//! Serves `GET /health` and streams a fixed SSE body for `POST /stream`.
//! Runs on its own thread and runtime so both async and CLI tests can use it.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub struct TestServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    /// Raw requests received so far (request line, headers and body).
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn stream_requests(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.starts_with("POST /stream"))
            .collect()
    }
}

/// Answer every `POST /stream` with `status` and `chunks`, written one by one.
pub fn spawn_server(status: u16, chunks: Vec<String>) -> TestServer {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    std_listener.set_nonblocking(true).unwrap();
    let port = std_listener.local_addr().unwrap().port();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = TcpListener::from_std(std_listener).unwrap();
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let chunks = chunks.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    handle(socket, status, chunks, recorded).await;
                });
            }
        });
    });

    TestServer {
        base_url: format!("http://127.0.0.1:{}", port),
        requests,
    }
}

/// SSE body lines for the "What is a contract?" exchange.
pub fn contract_chunks() -> Vec<String> {
    vec![
        "event: status\r\ndata: {\"message\": \"Searching legal documents...\"}\r\n\r\n".into(),
        "data: {\"sources\": [\"Act A\"], \"doc_count\": 2}\r\n\r\n".into(),
        "data: {\"content\": \"A con".into(),
        "tract \"}\r\n\r\ndata: {\"content\": \"is an agreement.\"}\r\n\r\n".into(),
        "event: complete\r\ndata: {\"message\": \"Answer complete\"}\r\n\r\n".into(),
    ]
}

/// Port with nothing listening on it.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

async fn handle(
    mut socket: TcpStream,
    status: u16,
    chunks: Vec<String>,
    recorded: Arc<Mutex<Vec<String>>>,
) {
    let request = read_request(&mut socket).await;
    recorded.lock().unwrap().push(request.clone());

    if request.starts_with("GET /health") {
        let body = r#"{"status":"healthy"}"#;
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
        return;
    }

    let reason = if status == 200 { "OK" } else { "Error" };
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n",
        status, reason
    );
    if socket.write_all(head.as_bytes()).await.is_err() {
        return;
    }
    if status == 200 {
        for chunk in chunks {
            if socket.write_all(chunk.as_bytes()).await.is_err() {
                return;
            }
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    } else {
        let _ = socket.write_all(b"internal error").await;
    }
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    loop {
        if let Some(head_end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
            let content_length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                break;
            }
        }
        match socket.read(&mut tmp).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&tmp[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
