//! Per-request processor lifecycle.
//!
//! `HookFactories` lives in the server for its whole lifetime. For each
//! request the codec calls [`HookFactories::instantiate`] once the head has
//! been parsed, fans the parse events out through [`ActiveHooks`], and then
//! freezes the instances into a [`RequestHooks`] that travels with the
//! request as a typed extension.

use std::fmt;
use std::sync::Arc;

use super::processor::{
    HeaderProcessor, HeaderProcessorFactory, RequestProcessor, RequestProcessorFactory,
};
use crate::observability::metrics;

/// Optional processor constructors configured on the server.
#[derive(Clone, Default)]
pub struct HookFactories {
    /// Called once per request to build its header processor.
    pub new_header_processor: Option<HeaderProcessorFactory>,
    /// Called once per request to build its request processor.
    pub new_request_processor: Option<RequestProcessorFactory>,
}

impl HookFactories {
    /// True when neither family has a constructor configured.
    pub fn is_empty(&self) -> bool {
        self.new_header_processor.is_none() && self.new_request_processor.is_none()
    }

    /// Build fresh processors for a single request.
    pub fn instantiate(&self) -> ActiveHooks {
        let header = self.new_header_processor.as_ref().map(|new| {
            metrics::record_processor_created("header");
            new()
        });
        let request = self.new_request_processor.as_ref().map(|new| {
            metrics::record_processor_created("request");
            new()
        });
        ActiveHooks { header, request }
    }
}

impl fmt::Debug for HookFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookFactories")
            .field("new_header_processor", &self.new_header_processor.is_some())
            .field("new_request_processor", &self.new_request_processor.is_some())
            .finish()
    }
}

/// Processors receiving callbacks while one request head is parsed.
#[derive(Default)]
pub struct ActiveHooks {
    header: Option<Box<dyn HeaderProcessor>>,
    request: Option<Box<dyn RequestProcessor>>,
}

impl ActiveHooks {
    /// Deliver the raw request line, without its CRLF terminator.
    pub fn on_request_line(&mut self, line: &[u8]) {
        if let Some(request) = self.request.as_mut() {
            request.request_line(line);
        }
    }

    /// Deliver one header field. `canonical` is only computed when a header
    /// processor is present.
    pub fn on_header(&mut self, key: &[u8], value: &[u8], canonical: impl FnOnce(&[u8]) -> String) {
        if let Some(request) = self.request.as_mut() {
            request.header(key, value);
        }
        if let Some(header) = self.header.as_mut() {
            header.header_raw(key);
            header.header_canonical(&canonical(key));
        }
    }

    /// Stop delivering callbacks and share the instances with the handler.
    pub fn freeze(self) -> RequestHooks {
        RequestHooks {
            header_processor: self.header.map(Arc::from),
            request_processor: self.request.map(Arc::from),
        }
    }
}

/// Processors attached to a request, read by handlers.
///
/// Always present in the request extensions. A field is `None` exactly when
/// the corresponding constructor was not configured.
#[derive(Clone, Default)]
pub struct RequestHooks {
    /// Header processor built for this request, after it saw every header.
    pub header_processor: Option<Arc<dyn HeaderProcessor>>,
    /// Request processor built for this request, after it saw the request
    /// line and every header.
    pub request_processor: Option<Arc<dyn RequestProcessor>>,
}

impl RequestHooks {
    /// The header processor as its concrete type, if it is a `T`.
    pub fn header_processor_as<T: HeaderProcessor>(&self) -> Option<&T> {
        self.header_processor.as_deref()?.downcast_ref::<T>()
    }

    /// The request processor as its concrete type, if it is a `T`.
    pub fn request_processor_as<T: RequestProcessor>(&self) -> Option<&T> {
        self.request_processor.as_deref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for RequestHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHooks")
            .field("header_processor", &self.header_processor.is_some())
            .field("request_processor", &self.request_processor.is_some())
            .finish()
    }
}
