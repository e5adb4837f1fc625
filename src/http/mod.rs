//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (ALPN: h2 → h2.rs, otherwise → h1.rs)
//!     → h1.rs / h2.rs (parse head, fire processor hooks)
//!     → canonical.rs (canonical key for header_canonical)
//!     → server.rs dispatch (RequestHooks + RequestId + ConnectInfo → router)
//!     → h1.rs / h2.rs (write response)
//! ```

pub mod canonical;
pub mod error;
pub(crate) mod h1;
pub(crate) mod h2;
pub mod request;
pub mod server;

pub use canonical::canonical_header_key;
pub use error::HttpError;
pub use request::{RequestId, X_REQUEST_ID};
pub use server::{HookServer, HookServerBuilder, ServerError};
