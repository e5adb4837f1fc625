//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::Router;
use header_hooks::config::{ServerConfig, TlsConfig};
use header_hooks::hooks::{HeaderProcessor, RequestProcessor};
use header_hooks::lifecycle::Shutdown;
use header_hooks::{HookServer, HookServerBuilder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// A running server bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<()>,
}

impl TestServer {
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn https_url(&self, path: &str) -> String {
        format!("https://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}

pub fn config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.timeouts.shutdown_grace_secs = 1;
    config
}

pub fn tls_config() -> ServerConfig {
    let fixtures = format!("{}/tests/fixtures", env!("CARGO_MANIFEST_DIR"));
    let mut config = config();
    config.listener.tls = Some(TlsConfig::new(
        format!("{fixtures}/cert.pem"),
        format!("{fixtures}/key.pem"),
    ));
    config
}

/// Build the server, bind it and run it in the background.
pub async fn start(builder: HookServerBuilder, app: Router) -> TestServer {
    let server = builder.build(app).expect("server builds");
    let listener = server.bind().await.expect("listener binds");
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestServer {
        addr,
        shutdown,
        handle,
    }
}

pub async fn start_plain(app: Router) -> TestServer {
    start(HookServer::builder(config()), app).await
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Client that negotiates h2 over TLS with the self-signed fixture.
pub fn https_client() -> reqwest::Client {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .no_proxy()
        .build()
        .unwrap()
}

/// Write `request` verbatim and read until the server closes the connection.
pub async fn raw_exchange(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("server closed the connection")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

/// Body of the last response in a raw exchange.
pub fn last_body(raw: &str) -> &str {
    raw.rsplit("\r\n\r\n").next().unwrap_or("")
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Header processor that only carries a unique instance id.
pub struct TestHeaderProcessor {
    pub id: u64,
}

impl TestHeaderProcessor {
    pub fn new() -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
        }
    }
}

impl HeaderProcessor for TestHeaderProcessor {
    fn header_raw(&mut self, _key: &[u8]) {}

    fn header_canonical(&mut self, _key: &str) {}
}

/// Request processor with no behavior.
pub struct TestRequestProcessor;

impl RequestProcessor for TestRequestProcessor {
    fn request_line(&mut self, _line: &[u8]) {}

    fn header(&mut self, _key: &[u8], _value: &[u8]) {}
}
