//! Minimal HTTP/1.1 server for integration tests
//!
//! Each path maps to a list of scripted responses; the n-th request to a path
//! gets the n-th response (the last one repeats). Every request path is
//! recorded so tests can assert which requests were made.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Reply {
    /// 200 with `Content-Length` and the full body
    Body(Vec<u8>),
    /// 200 without `Content-Length`; the body ends when the connection closes
    BodyWithoutLength(Vec<u8>),
    /// Declares `declared` bytes but sends only `body` before closing
    Truncated { body: Vec<u8>, declared: u64 },
    /// Sends headers and `body`, then holds the connection open for `hold`
    Stall {
        body: Vec<u8>,
        declared: u64,
        hold: Duration,
    },
    /// Bare status line with an empty body
    Status(u16),
}

#[derive(Clone)]
pub struct TestServer {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    /// Start serving `routes` on an ephemeral port; unknown paths get 404
    pub fn start(routes: Vec<(&str, Vec<Reply>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();

        let routes: Arc<HashMap<String, Vec<Reply>>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, replies)| (path.to_string(), replies))
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let routes = Arc::clone(&routes);
                let log = Arc::clone(&log);
                thread::spawn(move || handle(stream, &routes, &log));
            }
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            requests,
        }
    }

    /// Absolute URL for `path` (which starts with `/`)
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Number of requests received for `path`
    pub fn hits(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.as_str() == path)
            .count()
    }
}

/// URL on a port nothing listens on
pub fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/", port)
}

fn handle(mut stream: TcpStream, routes: &HashMap<String, Vec<Reply>>, log: &Mutex<Vec<String>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));

    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();

    let seen = {
        let mut log = log.lock().unwrap();
        let seen = log.iter().filter(|p| **p == path).count();
        log.push(path.clone());
        seen
    };

    let reply = routes
        .get(&path)
        .and_then(|replies| replies.get(seen).or_else(|| replies.last()))
        .cloned()
        .unwrap_or(Reply::Status(404));

    match reply {
        Reply::Body(body) => {
            write_head(&mut stream, 200, Some(body.len() as u64));
            let _ = stream.write_all(&body);
        },
        Reply::BodyWithoutLength(body) => {
            write_head(&mut stream, 200, None);
            let _ = stream.write_all(&body);
        },
        Reply::Truncated { body, declared } => {
            write_head(&mut stream, 200, Some(declared));
            let _ = stream.write_all(&body);
        },
        Reply::Stall {
            body,
            declared,
            hold,
        } => {
            write_head(&mut stream, 200, Some(declared));
            let _ = stream.write_all(&body);
            let _ = stream.flush();
            thread::sleep(hold);
        },
        Reply::Status(code) => write_head(&mut stream, code, Some(0)),
    }
    let _ = stream.flush();
    let _ = stream.shutdown(std::net::Shutdown::Both);
}

fn write_head(stream: &mut TcpStream, status: u16, content_length: Option<u64>) {
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    };
    let length = content_length
        .map(|len| format!("Content-Length: {}\r\n", len))
        .unwrap_or_default();
    let head = format!(
        "HTTP/1.1 {} {}\r\n{}Content-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        status, reason, length
    );
    let _ = stream.write_all(head.as_bytes());
}
