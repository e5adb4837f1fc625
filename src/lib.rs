//! HTTP server with request-head processor hooks.
//!
//! Callers register optional constructors for [`HeaderProcessor`] and
//! [`RequestProcessor`]. For every request the server builds fresh
//! instances, feeds them the raw request line and header fields as they are
//! parsed, and hands them to the application router inside a
//! [`RequestHooks`] extension.
//!
//! The [`kyber`] module carries the Kyber KEM parameter table.

pub mod config;
pub mod hooks;
pub mod http;
pub mod kyber;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::ServerConfig;
pub use hooks::{HeaderProcessor, RequestHooks, RequestProcessor};
pub use http::{HookServer, HookServerBuilder};
pub use lifecycle::Shutdown;
