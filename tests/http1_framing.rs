//! HTTP/1.1 framing, limits and connection lifecycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::routing::{get, post};
use axum::{Extension, Router};
use header_hooks::hooks::{HeaderProcessor, RequestHooks};
use header_hooks::HookServer;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

mod common;
use common::TestHeaderProcessor;

fn echo_app() -> Router {
    Router::new()
        .route("/", get(|| async { "hello" }))
        .route("/echo", post(|body: Bytes| async move { body }))
}

/// Server whose processor constructor counts how often it runs.
async fn counting_server(config: header_hooks::ServerConfig) -> (common::TestServer, Arc<AtomicUsize>) {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let builder = HookServer::builder(config).header_processor(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        TestHeaderProcessor::new()
    });
    (common::start(builder, echo_app()).await, created)
}

#[tokio::test]
async fn test_keep_alive_builds_processor_per_request() {
    let app = Router::new().route(
        "/",
        get(|Extension(hooks): Extension<RequestHooks>| async move {
            hooks
                .header_processor_as::<TestHeaderProcessor>()
                .map(|p| p.id.to_string())
                .unwrap_or_default()
        }),
    );
    let builder = HookServer::builder(common::config()).header_processor(TestHeaderProcessor::new);
    let server = common::start(builder, app).await;

    let raw = common::raw_exchange(
        server.addr,
        b"GET / HTTP/1.1\r\nHost: a\r\n\r\n\
          GET / HTTP/1.1\r\nHost: a\r\nConnection: close\r\n\r\n",
    )
    .await;

    let responses: Vec<&str> = raw.split("HTTP/1.1 200 OK\r\n").skip(1).collect();
    assert_eq!(responses.len(), 2, "unexpected response: {raw}");
    let ids: Vec<&str> = responses
        .iter()
        .map(|r| r.split("\r\n\r\n").nth(1).unwrap())
        .collect();
    assert_ne!(ids[0], ids[1]);
    assert!(raw.contains("connection: close\r\n"));

    server.stop().await;
}

#[tokio::test]
async fn test_http10_closes_by_default() {
    let server = common::start_plain(echo_app()).await;

    let raw = common::raw_exchange(server.addr, b"GET / HTTP/1.0\r\nHost: a\r\n\r\n").await;
    assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(common::last_body(&raw), "hello");

    server.stop().await;
}

#[tokio::test]
async fn test_http10_keep_alive_is_announced() {
    let server = common::start_plain(echo_app()).await;

    let raw = common::raw_exchange(
        server.addr,
        b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n\
          GET / HTTP/1.0\r\n\r\n",
    )
    .await;

    let responses: Vec<&str> = raw.split("HTTP/1.1 200 OK\r\n").skip(1).collect();
    assert_eq!(responses.len(), 2, "unexpected response: {raw}");
    assert!(responses[0].contains("connection: keep-alive\r\n"));
    assert!(responses[1].contains("connection: close\r\n"));

    server.stop().await;
}

#[tokio::test]
async fn test_response_carries_request_id() {
    let server = common::start_plain(echo_app()).await;

    let res = common::http_client()
        .get(server.http_url("/"))
        .send()
        .await
        .unwrap();
    let id = res.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());

    server.stop().await;
}

#[tokio::test]
async fn test_content_length_body() {
    let server = common::start_plain(echo_app()).await;

    let res = common::http_client()
        .post(server.http_url("/echo"))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "payload");

    server.stop().await;
}

#[tokio::test]
async fn test_chunked_body() {
    let server = common::start_plain(echo_app()).await;

    let raw = common::raw_exchange(
        server.addr,
        b"POST /echo HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
          5\r\nhello\r\n6\r\n world\r\n0\r\nX-Trailer: t\r\n\r\n",
    )
    .await;
    assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"), "unexpected response: {raw}");
    assert_eq!(common::last_body(&raw), "hello world");

    server.stop().await;
}

#[tokio::test]
async fn test_expect_continue() {
    let server = common::start_plain(echo_app()).await;

    let stream = TcpStream::connect(server.addr).await.unwrap();
    let mut stream = BufReader::new(stream);
    stream
        .get_mut()
        .write_all(
            b"POST /echo HTTP/1.1\r\nHost: a\r\nContent-Length: 4\r\n\
              Expect: 100-continue\r\nConnection: close\r\n\r\n",
        )
        .await
        .unwrap();

    let mut line = String::new();
    stream.read_line(&mut line).await.unwrap();
    assert_eq!(line, "HTTP/1.1 100 Continue\r\n");
    line.clear();
    stream.read_line(&mut line).await.unwrap();
    assert_eq!(line, "\r\n");

    stream.get_mut().write_all(b"ping").await.unwrap();
    let mut rest = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(rest.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(common::last_body(&rest), "ping");

    server.stop().await;
}

#[tokio::test]
async fn test_head_request_has_no_body() {
    let server = common::start_plain(echo_app()).await;

    let raw = common::raw_exchange(
        server.addr,
        b"HEAD / HTTP/1.1\r\nHost: a\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(raw.contains("content-length: 5\r\n"));
    assert!(raw.ends_with("\r\n\r\n"));

    server.stop().await;
}

#[tokio::test]
async fn test_too_many_headers_rejected_before_processing() {
    let mut config = common::config();
    config.limits.max_headers = 4;
    let (server, created) = counting_server(config).await;

    let mut request = String::from("GET / HTTP/1.1\r\nHost: a\r\n");
    for i in 0..8 {
        request.push_str(&format!("X-Filler-{i}: v\r\n"));
    }
    request.push_str("\r\n");

    let raw = common::raw_exchange(server.addr, request.as_bytes()).await;
    assert!(raw.starts_with("HTTP/1.1 431 "), "unexpected response: {raw}");
    assert_eq!(created.load(Ordering::SeqCst), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_oversized_head_rejected() {
    let mut config = common::config();
    config.limits.max_header_bytes = 256;
    let (server, created) = counting_server(config).await;

    let request = format!(
        "GET / HTTP/1.1\r\nHost: a\r\nX-Big: {}\r\n\r\n",
        "x".repeat(512)
    );
    let raw = common::raw_exchange(server.addr, request.as_bytes()).await;
    assert!(raw.starts_with("HTTP/1.1 431 "), "unexpected response: {raw}");
    assert_eq!(created.load(Ordering::SeqCst), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_declared_body_over_limit() {
    let mut config = common::config();
    config.limits.max_body_bytes = 16;
    let (server, created) = counting_server(config).await;

    let raw = common::raw_exchange(
        server.addr,
        b"POST /echo HTTP/1.1\r\nHost: a\r\nContent-Length: 1024\r\n\r\n",
    )
    .await;
    assert!(raw.starts_with("HTTP/1.1 413 "), "unexpected response: {raw}");
    assert_eq!(created.load(Ordering::SeqCst), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_ambiguous_framing_rejected() {
    let (server, created) = counting_server(common::config()).await;

    let raw = common::raw_exchange(
        server.addr,
        b"POST /echo HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\n\
          Transfer-Encoding: chunked\r\n\r\n",
    )
    .await;
    assert!(raw.starts_with("HTTP/1.1 400 "), "unexpected response: {raw}");
    assert_eq!(created.load(Ordering::SeqCst), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_transfer_encoding_not_implemented() {
    let (server, _) = counting_server(common::config()).await;

    let raw = common::raw_exchange(
        server.addr,
        b"POST /echo HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: gzip, chunked\r\n\r\n",
    )
    .await;
    assert!(raw.starts_with("HTTP/1.1 501 "), "unexpected response: {raw}");

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_request_line() {
    let (server, created) = counting_server(common::config()).await;

    let raw = common::raw_exchange(server.addr, b"NOT A REQUEST\r\n\r\n").await;
    assert!(raw.starts_with("HTTP/1.1 400 "), "unexpected response: {raw}");
    assert_eq!(created.load(Ordering::SeqCst), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_stops_server() {
    let server = common::start_plain(echo_app()).await;
    let addr = server.addr;

    server.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server stops after shutdown")
        .unwrap();

    assert!(TcpStream::connect(addr).await.is_err());
}

#[test]
fn test_processor_trait_objects_are_shareable() {
    fn assert_send_sync<T: Send + Sync + ?Sized>() {}
    assert_send_sync::<dyn HeaderProcessor>();
    assert_send_sync::<RequestHooks>();
}
