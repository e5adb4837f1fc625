//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Connection and codec tasks produce:
//!     → logging.rs (structured log events, connection/request ids as fields)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;
