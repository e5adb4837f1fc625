//! HTTP/1.x codec with processor hooks.
//!
//! # Responsibilities
//! - Read request heads off the wire and fire processor callbacks with the
//!   raw request line and raw header fields
//! - Frame request bodies (Content-Length, chunked) within configured limits
//! - Serialize handler responses and manage keep-alive
//!
//! # Design Decisions
//! - Processors are instantiated only once a head has parsed completely, so a
//!   head arriving over several reads still gets exactly one instance
//! - Rejected heads never create processors
//! - Bodies are buffered before the handler runs; responses are buffered and
//!   always carry an explicit content-length
//! - Every read has a deadline: `header_read_secs` for the first head,
//!   `idle_secs` between requests, `request_secs` for a body

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{CONNECTION, CONTENT_LENGTH, EXPECT, TRANSFER_ENCODING};
use axum::http::{
    response, HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri,
    Version,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use httparse::Status;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;

use crate::config::LimitsConfig;
use crate::hooks::{HookFactories, RequestHooks};
use crate::http::canonical::canonical_header_key;
use crate::http::error::HttpError;
use crate::http::server::{dispatch, ServerState};
use crate::observability::metrics;

const READ_CHUNK: usize = 8 * 1024;
const MAX_CHUNK_SIZE_LINE: usize = 4 * 1024;

/// How the request body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyKind {
    Empty,
    Length(usize),
    Chunked,
}

/// A parsed request head, before the body has been read.
#[derive(Debug)]
pub(crate) struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: BodyKind,
    pub keep_alive: bool,
    pub expect_continue: bool,
}

impl RequestHead {
    pub fn into_request(self, body: Bytes) -> Request<Body> {
        let mut request = Request::new(Body::from(body));
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers;
        request
    }
}

/// Result of a successful head parse.
pub(crate) struct ParsedHead {
    pub head: RequestHead,
    pub hooks: RequestHooks,
    /// Bytes of the buffer consumed by the head.
    pub len: usize,
}

/// Try to parse a complete request head from `buf`.
///
/// Returns `Ok(None)` when more bytes are needed. On success the configured
/// processors have already observed the request line and every header field.
pub(crate) fn parse_head(
    buf: &[u8],
    limits: &LimitsConfig,
    factories: &HookFactories,
) -> Result<Option<ParsedHead>, HttpError> {
    let mut storage = vec![httparse::EMPTY_HEADER; limits.max_headers];
    let mut parsed = httparse::Request::new(&mut storage);
    let len = match parsed.parse(buf) {
        Ok(Status::Complete(len)) => len,
        Ok(Status::Partial) => return Ok(None),
        Err(httparse::Error::TooManyHeaders) => {
            return Err(HttpError::TooManyHeaders(limits.max_headers))
        }
        Err(e) => return Err(HttpError::Malformed(e.to_string())),
    };
    if len > limits.max_header_bytes {
        return Err(HttpError::HeadTooLarge(limits.max_header_bytes));
    }

    let method = parsed
        .method
        .ok_or_else(|| HttpError::Malformed("missing method".into()))
        .and_then(|method| {
            Method::from_bytes(method.as_bytes())
                .map_err(|_| HttpError::Malformed(format!("invalid method '{method}'")))
        })?;
    let uri = parsed
        .path
        .ok_or_else(|| HttpError::Malformed("missing request target".into()))
        .and_then(|target| {
            Uri::try_from(target)
                .map_err(|_| HttpError::Malformed(format!("invalid request target '{target}'")))
        })?;
    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        _ => return Err(HttpError::Malformed("unsupported HTTP version".into())),
    };

    let mut headers = HeaderMap::with_capacity(parsed.headers.len());
    for header in parsed.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|_| HttpError::Malformed(format!("invalid header name '{}'", header.name)))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|_| HttpError::Malformed(format!("invalid value for '{}'", header.name)))?;
        headers.append(name, value);
    }

    let body = body_kind(&headers, limits)?;
    let keep_alive = wants_keep_alive(version, &headers);
    let expect_continue = version == Version::HTTP_11
        && headers
            .get(EXPECT)
            .is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"));

    let mut active = factories.instantiate();
    active.on_request_line(request_line(&buf[..len]));
    for header in parsed.headers.iter() {
        active.on_header(header.name.as_bytes(), header.value, canonical_header_key);
    }

    Ok(Some(ParsedHead {
        head: RequestHead {
            method,
            uri,
            version,
            headers,
            body,
            keep_alive,
            expect_continue,
        },
        hooks: active.freeze(),
        len,
    }))
}

/// The request line as received, without leading blank lines or its terminator.
fn request_line(head: &[u8]) -> &[u8] {
    let start = head
        .iter()
        .position(|b| *b != b'\r' && *b != b'\n')
        .unwrap_or(head.len());
    let rest = &head[start..];
    let end = rest.iter().position(|b| *b == b'\n').unwrap_or(rest.len());
    let line = &rest[..end];
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn body_kind(headers: &HeaderMap, limits: &LimitsConfig) -> Result<BodyKind, HttpError> {
    if headers.contains_key(TRANSFER_ENCODING) {
        if headers.contains_key(CONTENT_LENGTH) {
            return Err(HttpError::Malformed(
                "both content-length and transfer-encoding present".into(),
            ));
        }
        let codings: Vec<String> = headers
            .get_all(TRANSFER_ENCODING)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .flat_map(|value| {
                value
                    .split(',')
                    .map(|coding| coding.trim().to_ascii_lowercase())
                    .filter(|coding| !coding.is_empty())
                    .collect::<Vec<_>>()
            })
            .collect();
        return match codings.as_slice() {
            [only] if only == "chunked" => Ok(BodyKind::Chunked),
            _ => Err(HttpError::UnsupportedTransferEncoding(codings.join(", "))),
        };
    }

    let mut length: Option<u64> = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let parsed = value
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .ok_or_else(|| HttpError::Malformed("invalid content-length".into()))?;
        if length.is_some_and(|seen| seen != parsed) {
            return Err(HttpError::Malformed("conflicting content-length values".into()));
        }
        length = Some(parsed);
    }

    match length {
        None | Some(0) => Ok(BodyKind::Empty),
        Some(len) => match usize::try_from(len) {
            Ok(len) if len <= limits.max_body_bytes => Ok(BodyKind::Length(len)),
            _ => Err(HttpError::BodyTooLarge(limits.max_body_bytes)),
        },
    }
}

fn connection_has(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|candidate| candidate.trim().eq_ignore_ascii_case(token))
}

fn wants_keep_alive(version: Version, headers: &HeaderMap) -> bool {
    if connection_has(headers, "close") {
        return false;
    }
    version != Version::HTTP_10 || connection_has(headers, "keep-alive")
}

fn allows_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

/// Serialize the status line and headers. HTTP/1.0 peers need an explicit
/// `connection: keep-alive` to reuse the connection.
fn encode_response_head(
    parts: &response::Parts,
    body_len: usize,
    version: Version,
    keep_alive: bool,
) -> BytesMut {
    let mut out = BytesMut::with_capacity(256);
    let status = parts.status;
    out.put_slice(
        format!(
            "HTTP/1.1 {} {}\r\n",
            status.as_str(),
            status.canonical_reason().unwrap_or("")
        )
        .as_bytes(),
    );
    for (name, value) in parts.headers.iter() {
        if name == CONTENT_LENGTH || name == TRANSFER_ENCODING || name == CONNECTION {
            continue;
        }
        out.put_slice(name.as_str().as_bytes());
        out.put_slice(b": ");
        out.put_slice(value.as_bytes());
        out.put_slice(b"\r\n");
    }
    if !keep_alive {
        out.put_slice(b"connection: close\r\n");
    } else if version == Version::HTTP_10 {
        out.put_slice(b"connection: keep-alive\r\n");
    }
    if allows_body(status) {
        out.put_slice(format!("content-length: {body_len}\r\n").as_bytes());
    }
    out.put_slice(b"\r\n");
    out
}

/// One HTTP/1.x connection: the stream plus bytes read but not yet consumed.
pub(crate) struct H1Connection<S> {
    io: S,
    buf: BytesMut,
    limits: LimitsConfig,
}

impl<S> H1Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: S, limits: LimitsConfig) -> Self {
        Self {
            io,
            buf: BytesMut::with_capacity(READ_CHUNK),
            limits,
        }
    }

    async fn fill(&mut self) -> Result<usize, HttpError> {
        self.buf.reserve(READ_CHUNK);
        Ok(self.io.read_buf(&mut self.buf).await?)
    }

    async fn fill_or_eof(&mut self) -> Result<(), HttpError> {
        match self.fill().await? {
            0 => Err(HttpError::UnexpectedEof),
            _ => Ok(()),
        }
    }

    /// Read the next request head. `Ok(None)` means the peer closed the
    /// connection cleanly between requests.
    pub async fn read_head(
        &mut self,
        factories: &HookFactories,
    ) -> Result<Option<(RequestHead, RequestHooks)>, HttpError> {
        loop {
            if !self.buf.is_empty() {
                if let Some(parsed) = parse_head(&self.buf, &self.limits, factories)? {
                    self.buf.advance(parsed.len);
                    return Ok(Some((parsed.head, parsed.hooks)));
                }
                if self.buf.len() > self.limits.max_header_bytes {
                    return Err(HttpError::HeadTooLarge(self.limits.max_header_bytes));
                }
            }
            if self.fill().await? == 0 {
                let idle = self.buf.iter().all(|b| *b == b'\r' || *b == b'\n');
                return if idle {
                    Ok(None)
                } else {
                    Err(HttpError::UnexpectedEof)
                };
            }
        }
    }

    pub async fn read_body(&mut self, kind: BodyKind) -> Result<Bytes, HttpError> {
        match kind {
            BodyKind::Empty => Ok(Bytes::new()),
            BodyKind::Length(len) => {
                while self.buf.len() < len {
                    self.fill_or_eof().await?;
                }
                Ok(self.buf.split_to(len).freeze())
            }
            BodyKind::Chunked => self.read_chunked().await,
        }
    }

    async fn read_chunked(&mut self) -> Result<Bytes, HttpError> {
        let max = self.limits.max_body_bytes;
        let mut body = BytesMut::new();
        loop {
            let (consumed, size) = loop {
                match httparse::parse_chunk_size(&self.buf) {
                    Ok(Status::Complete(found)) => break found,
                    Ok(Status::Partial) => {
                        if self.buf.len() > MAX_CHUNK_SIZE_LINE {
                            return Err(HttpError::Malformed("chunk size line too long".into()));
                        }
                        self.fill_or_eof().await?;
                    }
                    Err(_) => return Err(HttpError::Malformed("invalid chunk size".into())),
                }
            };
            self.buf.advance(consumed);

            if size == 0 {
                self.skip_trailers().await?;
                return Ok(body.freeze());
            }

            let size = usize::try_from(size)
                .ok()
                .filter(|size| body.len().saturating_add(*size) <= max)
                .ok_or(HttpError::BodyTooLarge(max))?;
            while self.buf.len() < size + 2 {
                self.fill_or_eof().await?;
            }
            body.extend_from_slice(&self.buf[..size]);
            if &self.buf[size..size + 2] != b"\r\n" {
                return Err(HttpError::Malformed("missing chunk terminator".into()));
            }
            self.buf.advance(size + 2);
        }
    }

    async fn skip_trailers(&mut self) -> Result<(), HttpError> {
        let max = self.limits.max_header_bytes;
        let mut seen = 0usize;
        loop {
            match self.buf.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    let blank = pos == 0 || (pos == 1 && self.buf[0] == b'\r');
                    self.buf.advance(pos + 1);
                    if blank {
                        return Ok(());
                    }
                    seen += pos + 1;
                    if seen > max {
                        return Err(HttpError::HeadTooLarge(max));
                    }
                }
                None => {
                    if seen + self.buf.len() > max {
                        return Err(HttpError::HeadTooLarge(max));
                    }
                    self.fill_or_eof().await?;
                }
            }
        }
    }

    pub async fn write_continue(&mut self) -> Result<(), HttpError> {
        self.io.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
        self.io.flush().await?;
        Ok(())
    }

    pub async fn write_response(
        &mut self,
        response: Response<Body>,
        version: Version,
        head_request: bool,
        keep_alive: bool,
    ) -> Result<(), HttpError> {
        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| HttpError::Body(e.to_string()))?;

        // HEAD responses arrive with the body stripped; advertise the GET length.
        let advertised = if head_request {
            parts
                .headers
                .get(CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(body.len())
        } else {
            body.len()
        };
        let mut out = encode_response_head(&parts, advertised, version, keep_alive);
        if !head_request && allows_body(parts.status) {
            out.put_slice(&body);
        }
        self.io.write_all(&out).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Answer a rejected request, if it deserves an answer, and close.
    pub async fn reject(&mut self, error: &HttpError) {
        if let Some(status) = error.status() {
            metrics::record_rejected(error.reason());
            let reason = status.canonical_reason().unwrap_or("Error");
            let raw = format!(
                "HTTP/1.1 {} {reason}\r\ncontent-type: text/plain; charset=utf-8\r\n\
                 connection: close\r\ncontent-length: {}\r\n\r\n{reason}",
                status.as_str(),
                reason.len(),
            );
            let _ = self.io.write_all(raw.as_bytes()).await;
        }
        let _ = self.io.shutdown().await;
    }

    pub async fn close(&mut self) {
        let _ = self.io.shutdown().await;
    }
}

/// Serve HTTP/1.x requests on `io` until the peer closes, an error occurs,
/// or shutdown is signalled between requests.
pub(crate) async fn serve_connection<S>(
    io: S,
    state: Arc<ServerState>,
    peer: SocketAddr,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), HttpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let timeouts = &state.config.timeouts;
    let header_read = Duration::from_secs(timeouts.header_read_secs);
    let idle = Duration::from_secs(timeouts.idle_secs);
    let body_read = Duration::from_secs(timeouts.request_secs);

    let mut conn = H1Connection::new(io, state.config.limits.clone());
    let mut first = true;

    loop {
        let wait = if first { header_read } else { idle };
        let next = tokio::select! {
            biased;
            _ = shutdown.recv() => {
                tracing::debug!(peer = %peer, "Closing connection for shutdown");
                conn.close().await;
                return Ok(());
            }
            next = tokio::time::timeout(wait, conn.read_head(&state.hooks)) => next,
        };

        let (head, hooks) = match next {
            Err(_) => {
                tracing::debug!(peer = %peer, first_request = first, "Timed out waiting for request head");
                conn.close().await;
                return Ok(());
            }
            Ok(Ok(None)) => return Ok(()),
            Ok(Ok(Some(parsed))) => parsed,
            Ok(Err(e)) => {
                conn.reject(&e).await;
                return Err(e);
            }
        };
        first = false;

        if head.expect_continue && head.body != BodyKind::Empty {
            conn.write_continue().await?;
        }
        let body = tokio::select! {
            biased;
            _ = shutdown.recv() => {
                tracing::debug!(peer = %peer, "Closing connection for shutdown during body read");
                conn.close().await;
                return Ok(());
            }
            body = tokio::time::timeout(body_read, conn.read_body(head.body)) => {
                body.unwrap_or_else(|_| Err(HttpError::BodyTimeout(body_read)))
            }
        };
        let body = match body {
            Ok(body) => body,
            Err(e) => {
                conn.reject(&e).await;
                return Err(e);
            }
        };

        let keep_alive = head.keep_alive;
        let version = head.version;
        let head_request = head.method == Method::HEAD;
        let request = head.into_request(body);
        let response = dispatch(&state, request, hooks, peer, "http/1.1").await;
        conn.write_response(response, version, head_request, keep_alive)
            .await?;

        if !keep_alive {
            conn.close().await;
            return Ok(());
        }
    }
}
