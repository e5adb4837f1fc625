//! Errors raised while serving a connection.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("request has more than {0} header fields")]
    TooManyHeaders(usize),

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("unsupported transfer coding '{0}'")]
    UnsupportedTransferEncoding(String),

    #[error("request body not received within {0:?}")]
    BodyTimeout(std::time::Duration),

    #[error("connection closed in the middle of a request")]
    UnexpectedEof,

    #[error("response body error: {0}")]
    Body(String),

    #[error("hyper error: {0}")]
    Hyper(#[from] hyper::Error),
}

impl HttpError {
    /// Status to answer with before closing, if the peer should get one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Malformed(_) => Some(StatusCode::BAD_REQUEST),
            HttpError::HeadTooLarge(_) | HttpError::TooManyHeaders(_) => {
                Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE)
            }
            HttpError::BodyTooLarge(_) => Some(StatusCode::PAYLOAD_TOO_LARGE),
            HttpError::UnsupportedTransferEncoding(_) => Some(StatusCode::NOT_IMPLEMENTED),
            HttpError::BodyTimeout(_) => Some(StatusCode::REQUEST_TIMEOUT),
            HttpError::Io(_)
            | HttpError::UnexpectedEof
            | HttpError::Body(_)
            | HttpError::Hyper(_) => None,
        }
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            HttpError::Io(_) => "io",
            HttpError::Malformed(_) => "malformed",
            HttpError::HeadTooLarge(_) => "head_too_large",
            HttpError::TooManyHeaders(_) => "too_many_headers",
            HttpError::BodyTooLarge(_) => "body_too_large",
            HttpError::UnsupportedTransferEncoding(_) => "transfer_encoding",
            HttpError::BodyTimeout(_) => "body_timeout",
            HttpError::UnexpectedEof => "eof",
            HttpError::Body(_) => "body",
            HttpError::Hyper(_) => "hyper",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_statuses() {
        assert_eq!(
            HttpError::TooManyHeaders(100).status(),
            Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE)
        );
        assert_eq!(
            HttpError::BodyTooLarge(10).status(),
            Some(StatusCode::PAYLOAD_TOO_LARGE)
        );
        assert_eq!(
            HttpError::UnsupportedTransferEncoding("gzip".into()).status(),
            Some(StatusCode::NOT_IMPLEMENTED)
        );
        assert_eq!(
            HttpError::BodyTimeout(std::time::Duration::from_secs(1)).status(),
            Some(StatusCode::REQUEST_TIMEOUT)
        );
        assert_eq!(HttpError::UnexpectedEof.status(), None);
    }
}
