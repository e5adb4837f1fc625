//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → accept loop stops → idle connections close
//!             → in-flight requests finish within the grace period
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
