#![allow(dead_code)]

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use insiderkit::{Fetcher, RetryPolicy, Throttle, UserAgent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub fn fixture_path(relative: impl AsRef<Path>) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

pub fn read_fixture(relative: impl AsRef<Path>) -> String {
    fs::read_to_string(fixture_path(relative)).expect("fixture file should be readable")
}

pub fn read_fixture_bytes(relative: impl AsRef<Path>) -> Vec<u8> {
    fs::read(fixture_path(relative)).expect("fixture file should be readable")
}

/// Fetcher with no throttling and millisecond retries, for stub-server tests.
pub fn fast_fetcher(max_retries: u32) -> Fetcher {
    fetcher_with_retry(RetryPolicy {
        delay: Duration::from_millis(1),
        max_retries,
        max_retry_after: Duration::from_secs(2),
    })
}

pub fn fetcher_with_retry(retry: RetryPolicy) -> Fetcher {
    Fetcher::new(
        Throttle::unlimited(),
        UserAgent::new("insiderkit tests", "example.com"),
        retry,
        Duration::from_secs(5),
    )
    .unwrap()
}

/// Canned response for one request path.
#[derive(Clone)]
pub struct Route {
    pub path: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Route {
    pub fn ok(path: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.to_string(),
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn status(path: &str, status: u16) -> Self {
        Self {
            path: path.to_string(),
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Minimal HTTP/1.1 server answering GETs from a fixed route table.
///
/// Several routes for one path answer successive requests in order, the last one
/// repeating. Unknown paths get a 404. Every request head is recorded.
pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl StubServer {
    pub async fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let mut table: HashMap<String, Vec<Route>> = HashMap::new();
        for route in routes {
            table.entry(route.path.clone()).or_default().push(route);
        }
        let routes = Arc::new(table);
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let routes = routes.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&head).to_string();
                    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let seen = {
                        let mut log = log.lock().unwrap();
                        let seen = log.iter().filter(|(p, _)| *p == path).count();
                        log.push((path.clone(), head));
                        seen
                    };

                    let (status, headers, body) = match routes.get(&path) {
                        Some(sequence) => {
                            let route = &sequence[seen.min(sequence.len() - 1)];
                            (route.status, route.headers.clone(), route.body.clone())
                        }
                        None => (404, Vec::new(), b"Not Found".to_vec()),
                    };

                    let mut response = format!(
                        "HTTP/1.1 {} Stub\r\nContent-Length: {}\r\nConnection: close\r\n",
                        status,
                        body.len()
                    );
                    for (name, value) in headers {
                        response.push_str(&format!("{}: {}\r\n", name, value));
                    }
                    response.push_str("\r\n");

                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { base_url, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Number of requests received for `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .count()
    }

    pub fn total_hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Raw request heads in arrival order.
    pub fn request_heads(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, head)| head.clone())
            .collect()
    }
}
