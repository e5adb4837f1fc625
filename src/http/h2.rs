//! HTTP/2 serving with processor hooks.
//!
//! HPACK decoding happens inside hyper, so processors observe the decoded
//! field names (lower case on the wire by protocol rule). Pseudo-header
//! fields are not delivered as headers; the request line is synthesized
//! from them as `METHOD SP path-and-query SP HTTP/2.0`.
//!
//! A connection must open its first stream within `header_read_secs` and is
//! closed with GOAWAY once it has had no open stream for `idle_secs`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use http_body_util::Limited;
use hyper::body::Incoming;
use hyper::server::conn::http2;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, watch};

use crate::hooks::{HookFactories, RequestHooks};
use crate::http::canonical::canonical_header_key;
use crate::http::error::HttpError;
use crate::http::server::{dispatch, ServerState};

/// Run the configured processors over a decoded HTTP/2 request head.
pub(crate) fn observe_head<B>(request: &Request<B>, factories: &HookFactories) -> RequestHooks {
    if factories.is_empty() {
        return RequestHooks::default();
    }

    let mut active = factories.instantiate();
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let line = format!("{} {} HTTP/2.0", request.method(), target);
    active.on_request_line(line.as_bytes());
    for (name, value) in request.headers() {
        active.on_header(name.as_str().as_bytes(), value.as_bytes(), canonical_header_key);
    }
    active.freeze()
}

/// Decrements the open-stream count when a stream's handler finishes.
struct StreamGuard(Arc<watch::Sender<usize>>);

impl StreamGuard {
    fn open(streams: &Arc<watch::Sender<usize>>) -> Self {
        streams.send_modify(|open| *open += 1);
        Self(Arc::clone(streams))
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.send_modify(|open| *open = open.saturating_sub(1));
    }
}

/// Resolve once no stream has been open for a full window. The first window
/// is `first`, every later one is `idle`.
async fn idle_deadline(streams: &mut watch::Receiver<usize>, first: Duration, idle: Duration) {
    let mut window = first;
    loop {
        if streams.wait_for(|open| *open == 0).await.is_err() {
            return std::future::pending().await;
        }
        match tokio::time::timeout(window, streams.changed()).await {
            Err(_) => return,
            Ok(Ok(())) => window = idle,
            Ok(Err(_)) => return std::future::pending().await,
        }
    }
}

/// Serve one HTTP/2 connection until the peer goes away, the connection sits
/// idle past its deadline, or shutdown is signalled. In the last two cases a
/// GOAWAY is sent and in-flight streams get the shutdown grace period.
pub(crate) async fn serve_connection<S>(
    io: S,
    state: Arc<ServerState>,
    peer: SocketAddr,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), HttpError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let limits = state.config.limits.clone();
    let timeouts = state.config.timeouts.clone();
    let (streams, mut open_streams) = watch::channel(0usize);
    let streams = Arc::new(streams);

    let service_state = Arc::clone(&state);
    let service = service_fn(move |request: Request<Incoming>| {
        let state = Arc::clone(&service_state);
        let guard = StreamGuard::open(&streams);
        async move {
            let _guard = guard;
            let hooks = observe_head(&request, &state.hooks);
            let max_body = state.config.limits.max_body_bytes;
            let request = request.map(|body| Body::new(Limited::new(body, max_body)));
            Ok::<_, Infallible>(dispatch(&state, request, hooks, peer, "h2").await)
        }
    });

    let conn = http2::Builder::new(TokioExecutor::new())
        .max_header_list_size(u32::try_from(limits.max_header_bytes).unwrap_or(u32::MAX))
        .serve_connection(TokioIo::new(io), service);
    tokio::pin!(conn);

    let reason = tokio::select! {
        res = conn.as_mut() => return Ok(res?),
        _ = shutdown.recv() => "shutdown",
        _ = idle_deadline(
            &mut open_streams,
            Duration::from_secs(timeouts.header_read_secs),
            Duration::from_secs(timeouts.idle_secs),
        ) => "idle",
    };

    tracing::debug!(peer = %peer, reason, "Draining HTTP/2 connection");
    conn.as_mut().graceful_shutdown();
    let grace = Duration::from_secs(timeouts.shutdown_grace_secs);
    match tokio::time::timeout(grace, conn.as_mut()).await {
        Ok(res) => res?,
        Err(_) => tracing::debug!(peer = %peer, "HTTP/2 peer did not finish closing, dropping"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HeaderOrderRecorder;

    #[test]
    fn synthesizes_request_line() {
        let factories = HookFactories {
            new_header_processor: Some(Arc::new(|| Box::new(HeaderOrderRecorder::default()))),
            new_request_processor: Some(Arc::new(|| Box::new(HeaderOrderRecorder::default()))),
        };
        let request = Request::builder()
            .method("POST")
            .uri("https://localhost/submit?x=1")
            .header("user-agent", "test")
            .body(())
            .unwrap();

        let hooks = observe_head(&request, &factories);
        let recorded = hooks.request_processor_as::<HeaderOrderRecorder>().unwrap();
        assert_eq!(recorded.request_line(), Some(&b"POST /submit?x=1 HTTP/2.0"[..]));

        let header = hooks.header_processor_as::<HeaderOrderRecorder>().unwrap();
        assert_eq!(header.fingerprint(), "user-agent");
        assert_eq!(header.canonical_keys(), ["User-Agent"]);
    }

    #[tokio::test]
    async fn idle_deadline_fires_without_streams() {
        let (_streams, mut open) = watch::channel(0usize);
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            idle_deadline(&mut open, Duration::from_millis(50), Duration::from_secs(60)),
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn idle_deadline_waits_for_open_streams() {
        let (streams, mut open) = watch::channel(0usize);
        let streams = Arc::new(streams);
        let guard = StreamGuard::open(&streams);
        assert_eq!(*streams.borrow(), 1);

        let deadline = idle_deadline(&mut open, Duration::from_millis(50), Duration::from_millis(50));
        tokio::pin!(deadline);
        let early = tokio::time::timeout(Duration::from_millis(200), deadline.as_mut()).await;
        assert!(early.is_err());

        drop(guard);
        let late = tokio::time::timeout(Duration::from_secs(5), deadline.as_mut()).await;
        assert!(late.is_ok());
    }

    #[test]
    fn no_factories_no_processors() {
        let request = Request::builder().uri("/").body(()).unwrap();
        let hooks = observe_head(&request, &HookFactories::default());
        assert!(hooks.header_processor.is_none());
        assert!(hooks.request_processor.is_none());
    }
}
