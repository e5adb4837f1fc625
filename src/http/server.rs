//! HTTP server setup and connection dispatch.
//!
//! # Responsibilities
//! - Hold the optional processor constructors and the caller's router
//! - Validate configuration and load TLS material once, at build time
//! - Accept connections, negotiate TLS/ALPN, hand off to the h1 or h2 codec
//! - Attach per-request hooks, request id and peer address, then call the router
//! - Drain connections on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderValue, Request, Response, StatusCode};
use axum::Router;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::Instrument;

use crate::config::{validate_config, ConfigError, ServerConfig};
use crate::hooks::{HeaderProcessor, HookFactories, RequestHooks, RequestProcessor};
use crate::http::error::HttpError;
use crate::http::request::{RequestId, X_REQUEST_ID};
use crate::http::{h1, h2};
use crate::net::{load_tls_acceptor, ConnectionPermit, ConnectionTracker, Listener, ListenerError, TlsError, ALPN_H2};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),
}

/// State shared by every connection task.
pub(crate) struct ServerState {
    pub(crate) config: ServerConfig,
    pub(crate) hooks: HookFactories,
    pub(crate) app: Router,
}

/// Attach request-scoped values and run the application router.
pub(crate) async fn dispatch(
    state: &ServerState,
    mut request: Request<Body>,
    hooks: RequestHooks,
    peer: SocketAddr,
    protocol: &'static str,
) -> Response<Body> {
    let start = Instant::now();
    let request_id = RequestId::new();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    tracing::debug!(
        request_id = %request_id,
        protocol,
        method = %method,
        path = %path,
        header_processor = hooks.header_processor.is_some(),
        request_processor = hooks.request_processor.is_some(),
        "Dispatching request"
    );

    let extensions = request.extensions_mut();
    extensions.insert(hooks);
    extensions.insert(ConnectInfo(peer));
    extensions.insert(request_id);

    let mut response = match state.app.clone().oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }

    metrics::record_request(protocol, response.status().as_u16(), start);
    tracing::debug!(
        request_id = %request_id,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Request complete"
    );
    response
}

/// Builder for [`HookServer`].
pub struct HookServerBuilder {
    config: ServerConfig,
    hooks: HookFactories,
}

impl HookServerBuilder {
    /// Construct a header processor for every request.
    pub fn header_processor<F, P>(mut self, new: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: HeaderProcessor,
    {
        self.hooks.new_header_processor =
            Some(Arc::new(move || Box::new(new()) as Box<dyn HeaderProcessor>));
        self
    }

    /// Construct a request processor for every request.
    pub fn request_processor<F, P>(mut self, new: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: RequestProcessor,
    {
        self.hooks.new_request_processor =
            Some(Arc::new(move || Box::new(new()) as Box<dyn RequestProcessor>));
        self
    }

    /// Replace both constructors at once.
    pub fn hook_factories(mut self, hooks: HookFactories) -> Self {
        self.hooks = hooks;
        self
    }

    /// Validate the configuration, load TLS material and wrap `app`.
    pub fn build(self, app: Router) -> Result<HookServer, ServerError> {
        validate_config(&self.config).map_err(ConfigError::Validation)?;
        let tls = self
            .config
            .listener
            .tls
            .as_ref()
            .map(load_tls_acceptor)
            .transpose()?;

        tracing::info!(
            header_processor = self.hooks.new_header_processor.is_some(),
            request_processor = self.hooks.new_request_processor.is_some(),
            tls = tls.is_some(),
            "Hook server configured"
        );

        let app = wrap_app(&self.config, app);
        Ok(HookServer {
            state: Arc::new(ServerState {
                config: self.config,
                hooks: self.hooks,
                app,
            }),
            tls,
            tracker: ConnectionTracker::new(),
        })
    }
}

fn wrap_app(config: &ServerConfig, app: Router) -> Router {
    app.layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(config.timeouts.request_secs),
    ))
    .layer(TraceLayer::new_for_http())
}

/// HTTP server that runs processor hooks while reading request heads.
pub struct HookServer {
    state: Arc<ServerState>,
    tls: Option<TlsAcceptor>,
    tracker: ConnectionTracker,
}

impl HookServer {
    /// Start configuring a server. No processors are installed by default.
    pub fn builder(config: ServerConfig) -> HookServerBuilder {
        HookServerBuilder {
            config,
            hooks: HookFactories::default(),
        }
    }

    /// Bind the configured listener address.
    pub async fn bind(&self) -> Result<Listener, ServerError> {
        Ok(Listener::bind(&self.state.config.listener).await?)
    }

    /// The validated configuration the server was built with.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// The processor constructors run for every request.
    pub fn hook_factories(&self) -> &HookFactories {
        &self.state.hooks
    }

    /// Accept connections until `shutdown` fires, then wait for open
    /// connections to drain. Dropping every `Shutdown` handle also stops the
    /// server.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(
            address = %addr,
            tls = self.tls.is_some(),
            "HTTP server starting"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        self.spawn_connection(stream, peer, permit, shutdown.resubscribe());
                    }
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                    Err(e) => return Err(e.into()),
                },
            }
        }

        tracing::info!(
            active_connections = self.tracker.active_count(),
            "HTTP server draining"
        );
        let grace = Duration::from_secs(self.state.config.timeouts.shutdown_grace_secs);
        let remaining = self.tracker.wait_for_drain(grace).await;
        if remaining > 0 {
            tracing::warn!(remaining, "Connections still open after grace period");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    fn spawn_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        permit: ConnectionPermit,
        shutdown: broadcast::Receiver<()>,
    ) {
        let state = Arc::clone(&self.state);
        let tls = self.tls.clone();
        let guard = self.tracker.track();
        let connection_id = guard.id();
        let span = tracing::debug_span!("connection", %connection_id, %peer);

        tokio::spawn(
            async move {
                let _permit = permit;
                let _guard = guard;
                if let Err(e) = serve_stream(stream, tls, state, peer, shutdown).await {
                    tracing::debug!(error = %e, reason = e.reason(), "Connection ended with error");
                }
            }
            .instrument(span),
        );
    }
}

async fn serve_stream(
    stream: TcpStream,
    tls: Option<TlsAcceptor>,
    state: Arc<ServerState>,
    peer: SocketAddr,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), HttpError> {
    let _ = stream.set_nodelay(true);

    let Some(acceptor) = tls else {
        return h1::serve_connection(stream, state, peer, shutdown).await;
    };

    let handshake = Duration::from_secs(state.config.timeouts.header_read_secs);
    let stream = match tokio::time::timeout(handshake, acceptor.accept(stream)).await {
        Ok(stream) => stream?,
        Err(_) => {
            return Err(HttpError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "TLS handshake timed out",
            )))
        }
    };

    let negotiated_h2 = stream.get_ref().1.alpn_protocol() == Some(ALPN_H2);
    tracing::debug!(h2 = negotiated_h2, "TLS handshake complete");
    if negotiated_h2 {
        h2::serve_connection(stream, state, peer, shutdown).await
    } else {
        h1::serve_connection(stream, state, peer, shutdown).await
    }
}
