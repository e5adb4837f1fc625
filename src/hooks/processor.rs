//! Processor traits invoked while a request head is read off the wire.

use std::any::Any;
use std::sync::Arc;

/// Observes header keys before and after canonicalization.
///
/// Both methods are called inline on the connection task, once per header
/// field, in wire order. They have no return value: a processor that needs
/// to report something keeps it in its own state, which the handler can read
/// back through [`RequestHooks`](super::RequestHooks).
pub trait HeaderProcessor: Any + Send + Sync {
    /// Called with the key exactly as it was received.
    fn header_raw(&mut self, key: &[u8]);

    /// Called with the canonical form of the same key.
    fn header_canonical(&mut self, key: &str);
}

/// Observes the raw request line and raw header pairs.
pub trait RequestProcessor: Any + Send + Sync {
    /// Called once, after the request line is parsed. `line` excludes the
    /// line terminator.
    fn request_line(&mut self, line: &[u8]);

    /// Called on each raw key/value pair before the key is canonicalized.
    fn header(&mut self, key: &[u8], value: &[u8]);
}

/// Constructor for a fresh [`HeaderProcessor`], invoked once per request.
pub type HeaderProcessorFactory = Arc<dyn Fn() -> Box<dyn HeaderProcessor> + Send + Sync>;

/// Constructor for a fresh [`RequestProcessor`], invoked once per request.
pub type RequestProcessorFactory = Arc<dyn Fn() -> Box<dyn RequestProcessor> + Send + Sync>;

impl dyn HeaderProcessor {
    /// Returns the processor as `T` if that is its concrete type.
    pub fn downcast_ref<T: HeaderProcessor>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref::<T>()
    }

    pub fn is<T: HeaderProcessor>(&self) -> bool {
        (self as &dyn Any).is::<T>()
    }
}

impl dyn RequestProcessor {
    /// Returns the processor as `T` if that is its concrete type.
    pub fn downcast_ref<T: RequestProcessor>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref::<T>()
    }

    pub fn is<T: RequestProcessor>(&self) -> bool {
        (self as &dyn Any).is::<T>()
    }
}
