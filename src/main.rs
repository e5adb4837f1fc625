//! header-hooks demo server.
//!
//! Serves every path with a JSON report of the request's header order, as
//! seen by the processors before canonicalization.
//!
//! ```text
//! Client ─▶ listener ─▶ TLS/ALPN ─▶ h1/h2 codec ─▶ processors ─▶ router ─▶ JSON report
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{routing::any, Extension, Json, Router};
use clap::Parser;
use serde_json::{json, Value};

use header_hooks::config::{load_config, ServerConfig};
use header_hooks::hooks::{HeaderOrderRecorder, RequestHooks};
use header_hooks::lifecycle::{signals, Shutdown};
use header_hooks::observability::{logging, metrics};
use header_hooks::HookServer;

#[derive(Parser)]
#[command(name = "header-hooks")]
#[command(about = "HTTP server that reports raw request header order", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,
}

async fn report(Extension(hooks): Extension<RequestHooks>) -> Json<Value> {
    let request = hooks
        .request_processor_as::<HeaderOrderRecorder>()
        .map(HeaderOrderRecorder::report);
    let header = hooks
        .header_processor_as::<HeaderOrderRecorder>()
        .map(HeaderOrderRecorder::report);
    Json(json!({ "request": request, "header": header }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("header-hooks v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let app = Router::new()
        .route("/", any(report))
        .route("/{*path}", any(report));

    let server = HookServer::builder(config)
        .header_processor(HeaderOrderRecorder::default)
        .request_processor(HeaderOrderRecorder::default)
        .build(app)?;
    let listener = server.bind().await?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
