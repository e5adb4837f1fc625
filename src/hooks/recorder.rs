//! A processor that records header order for fingerprinting.

use serde::Serialize;

use super::processor::{HeaderProcessor, RequestProcessor};

/// Records everything it observes, in wire order.
///
/// Implements both processor families so the same type can be installed as
/// either constructor. Each family gets its own instance per request.
#[derive(Debug, Clone, Default)]
pub struct HeaderOrderRecorder {
    request_line: Option<Vec<u8>>,
    raw_keys: Vec<Vec<u8>>,
    raw_values: Vec<Vec<u8>>,
    canonical_keys: Vec<String>,
}

impl HeaderOrderRecorder {
    /// The raw request line. Only set when installed as a request processor.
    pub fn request_line(&self) -> Option<&[u8]> {
        self.request_line.as_deref()
    }

    /// Header names exactly as received, in wire order.
    pub fn raw_keys(&self) -> &[Vec<u8>] {
        &self.raw_keys
    }

    /// Only populated when installed as a request processor.
    pub fn raw_values(&self) -> &[Vec<u8>] {
        &self.raw_values
    }

    /// Only populated when installed as a header processor.
    pub fn canonical_keys(&self) -> &[String] {
        &self.canonical_keys
    }

    /// Raw header names joined in the order they arrived, e.g.
    /// `Host,User-Agent,Accept`.
    pub fn fingerprint(&self) -> String {
        self.raw_keys
            .iter()
            .map(|key| String::from_utf8_lossy(key))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Snapshot suitable for a JSON response.
    pub fn report(&self) -> FingerprintReport {
        FingerprintReport {
            request_line: self
                .request_line
                .as_deref()
                .map(|line| String::from_utf8_lossy(line).into_owned()),
            raw_keys: self
                .raw_keys
                .iter()
                .map(|key| String::from_utf8_lossy(key).into_owned())
                .collect(),
            canonical_keys: self.canonical_keys.clone(),
            fingerprint: self.fingerprint(),
        }
    }
}

impl HeaderProcessor for HeaderOrderRecorder {
    fn header_raw(&mut self, key: &[u8]) {
        self.raw_keys.push(key.to_vec());
    }

    fn header_canonical(&mut self, key: &str) {
        self.canonical_keys.push(key.to_string());
    }
}

impl RequestProcessor for HeaderOrderRecorder {
    fn request_line(&mut self, line: &[u8]) {
        self.request_line = Some(line.to_vec());
    }

    fn header(&mut self, key: &[u8], value: &[u8]) {
        self.raw_keys.push(key.to_vec());
        self.raw_values.push(value.to_vec());
    }
}

/// Serializable view of a [`HeaderOrderRecorder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerprintReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_line: Option<String>,
    pub raw_keys: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub canonical_keys: Vec<String>,
    pub fingerprint: String,
}
