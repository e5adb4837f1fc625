//! Request-head processor hooks.
//!
//! # Data Flow
//! ```text
//! HookFactories (configured once on the server)
//!     → instantiate() per request, after the head is parsed
//!     → ActiveHooks receives, in wire order:
//!           request_line(raw line)
//!           header(raw key, raw value)
//!           header_raw(raw key)
//!           header_canonical(canonical key)
//!     → freeze() into RequestHooks
//!     → request extension, read by the handler
//! ```
//!
//! # Design Decisions
//! - Processors are passed as a typed extension, never looked up by a string key
//! - An unconfigured family is `None`, never a default instance
//! - Callbacks have no error channel; they cannot affect parsing

pub mod context;
pub mod processor;
pub mod recorder;

pub use context::{ActiveHooks, HookFactories, RequestHooks};
pub use processor::{
    HeaderProcessor, HeaderProcessorFactory, RequestProcessor, RequestProcessorFactory,
};
pub use recorder::{FingerprintReport, HeaderOrderRecorder};
