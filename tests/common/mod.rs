//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tokio::task::JoinHandle;

use engine_server::http::{requested_protocol, switching_protocols};
use engine_server::net::AdmissionGuard;
use engine_server::{
    EngineConfig, EngineServer, RequestContext, Responder, ResponderError, Shutdown, Upgraded,
};

/// Container injected into every worker loop.
pub struct TestApp {
    pub greeting: &'static str,
}

/// `GET /` greets, `POST /echo` echoes, `GET /slow/<ms>` sleeps first,
/// `Upgrade: echo` switches to a raw echo.
pub struct TestResponder;

impl Responder<TestApp> for TestResponder {
    type Request = Request<Bytes>;
    type Response = Response<Bytes>;

    async fn respond(
        &self,
        request: Request<Bytes>,
        cx: &RequestContext<TestApp>,
    ) -> Result<Option<Response<Bytes>>, ResponderError> {
        if requested_protocol(&request) == Some("echo") {
            return switching_protocols("echo", echo).map(Some).map_err(ResponderError::new);
        }

        let path = request.uri().path().to_string();
        let body = if let Some(ms) = path.strip_prefix("/slow/") {
            let ms: u64 = ms.parse().map_err(ResponderError::new)?;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Bytes::from(path.clone())
        } else if *request.method() == Method::POST && path == "/echo" {
            request.into_body()
        } else if path == "/" {
            Bytes::from(format!("{} from worker {}", cx.container().greeting, cx.worker_id()))
        } else {
            return Ok(Some(text(StatusCode::NOT_FOUND, "missing")));
        };

        let mut response = Response::new(body);
        *response.status_mut() = StatusCode::OK;
        Ok(Some(response))
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from_static(body.as_bytes()));
    *response.status_mut() = status;
    response
}

async fn echo(io: Upgraded) -> std::io::Result<()> {
    let (mut reader, mut writer) = tokio::io::split(io);
    tokio::io::copy(&mut reader, &mut writer).await?;
    writer.shutdown().await
}

/// Loopback config on an ephemeral port with short timeouts.
pub fn test_config(workers: usize, ceiling: usize) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.server.hostname = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.worker_count = workers;
    config.server.max_connections_per_ip = ceiling;
    config.timeouts.shutdown_grace_secs = 1;
    config
}

/// A server running on the test's runtime.
pub struct TestServer {
    pub addr: SocketAddr,
    pub admission: Arc<AdmissionGuard>,
    shutdown: Shutdown,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(config: EngineConfig) -> Self {
        let shutdown = Shutdown::new();
        let app = Arc::new(TestApp { greeting: "hello" });
        let running = EngineServer::new(config, app)
            .expect("valid config")
            .bind(TestResponder, shutdown.subscribe())
            .await
            .expect("server binds");

        let addr = running.local_addr();
        let admission = running.admission();
        let handle = tokio::spawn(running.serve());
        Self {
            addr,
            admission,
            shutdown,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server to finish draining.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server stops within grace")
            .expect("server task");
    }
}

/// A parsed HTTP/1.1 response read off a raw socket.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub head: String,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim())
        })
    }
}

/// Raw client keeping bytes that arrive after a response.
pub struct RawClient {
    stream: TcpStream,
    buffered: Vec<u8>,
}

impl RawClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        Self::from_stream(TcpStream::connect(addr).await.expect("connect"))
    }

    /// Connect from a specific local address, e.g. a second loopback IP.
    pub async fn connect_from(local: IpAddr, addr: SocketAddr) -> Self {
        let socket = TcpSocket::new_v4().expect("socket");
        socket.bind(SocketAddr::new(local, 0)).expect("bind local");
        Self::from_stream(socket.connect(addr).await.expect("connect"))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            buffered: Vec::new(),
        }
    }

    pub async fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write");
    }

    /// `None` if the server closed the connection instead of answering.
    pub async fn get(&mut self, path: &str) -> Option<RawResponse> {
        let request = format!("GET {} HTTP/1.1\r\nHost: test\r\n\r\n", path);
        self.stream.write_all(request.as_bytes()).await.ok()?;
        self.response().await
    }

    /// Read one response. `None` if the server closed before sending one.
    pub async fn response(&mut self) -> Option<RawResponse> {
        let head_end = loop {
            if let Some(pos) = self.buffered.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            if !self.fill().await {
                return None;
            }
        };

        let head: Vec<u8> = self.buffered.drain(..head_end).collect();
        let head = String::from_utf8(head).expect("utf8 head");
        let status = head
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .expect("status code");

        let mut response = RawResponse {
            status,
            head,
            body: Vec::new(),
        };
        if let Some(length) = response.header("content-length") {
            let length: usize = length.parse().expect("content-length");
            response.body = self.read_exact(length).await;
        }
        Some(response)
    }

    pub async fn read_exact(&mut self, n: usize) -> Vec<u8> {
        while self.buffered.len() < n {
            assert!(self.fill().await, "connection closed early");
        }
        self.buffered.drain(..n).collect()
    }

    /// Whether the server closes the connection without sending anything more.
    pub async fn closed_within(&mut self, limit: Duration) -> bool {
        if !self.buffered.is_empty() {
            return false;
        }
        let mut chunk = [0u8; 64];
        match tokio::time::timeout(limit, self.stream.read(&mut chunk)).await {
            Ok(Ok(0)) | Ok(Err(_)) => true,
            Ok(Ok(_)) | Err(_) => false,
        }
    }

    async fn fill(&mut self) -> bool {
        let mut chunk = [0u8; 4096];
        match tokio::time::timeout(Duration::from_secs(5), self.stream.read(&mut chunk)).await {
            Ok(Ok(0)) | Ok(Err(_)) => false,
            Ok(Ok(n)) => {
                self.buffered.extend_from_slice(&chunk[..n]);
                true
            }
            Err(_) => panic!("timed out waiting for server bytes"),
        }
    }
}
