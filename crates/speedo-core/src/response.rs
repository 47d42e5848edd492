//! HTTP Response types

use crate::payload::PayloadStream;
use bytes::{Bytes, BytesMut};
use futures_util::{StreamExt, TryStreamExt};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{HeaderName, HeaderValue};
use smallvec::SmallVec;

/// Body type handed to hyper
pub type HyperBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// HTTP Status Code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const SWITCHING_PROTOCOLS: StatusCode = StatusCode(101);
    pub const OK: StatusCode = StatusCode(200);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);

    /// Get the numeric code
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Get the reason phrase
    pub fn reason_phrase(&self) -> &'static str {
        match self.0 {
            101 => "Switching Protocols",
            200 => "OK",
            404 => "Not Found",
            500 => "Internal Server Error",
            _ => "Unknown",
        }
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode(code)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.0, self.reason_phrase())
    }
}

/// Response body
pub enum Body {
    /// Fully materialised body (possibly empty)
    Full(Bytes),
    /// Incrementally produced body, pulled as the transport drains
    Stream(PayloadStream),
}

impl Body {
    pub fn empty() -> Self {
        Body::Full(Bytes::new())
    }

    /// Bytes of a fully materialised body
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Body::Full(b) => Some(b),
            Body::Stream(_) => None,
        }
    }

    /// Collect the body into one buffer
    pub async fn collect(self) -> std::io::Result<Bytes> {
        match self {
            Body::Full(b) => Ok(b),
            Body::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }

    fn into_hyper(self) -> HyperBody {
        match self {
            Body::Full(b) => Full::new(b).map_err(|never| match never {}).boxed_unsync(),
            Body::Stream(stream) => StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync(),
        }
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Full(b) => f.debug_tuple("Full").field(&b.len()).finish(),
            Body::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// HTTP Response
#[derive(Debug)]
pub struct Response {
    /// Status code
    pub status: StatusCode,
    /// Response headers (stack-allocated for small header counts)
    pub headers: SmallVec<[(String, String); 8]>,
    /// Response body
    pub body: Body,
}

impl Response {
    /// Create a new response
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: SmallVec::new(),
            body: Body::empty(),
        }
    }

    /// Empty 200 reachable from any origin
    pub fn empty_ok() -> Self {
        ResponseBuilder::new(StatusCode::OK).allow_any_origin().build()
    }

    /// 404 with a short plain-text body
    pub fn not_found() -> Self {
        ResponseBuilder::new(StatusCode::NOT_FOUND)
            .header("Content-Type", "text/plain")
            .sized_body("Not found")
            .build()
    }

    /// 404 with an empty body
    pub fn not_found_empty() -> Self {
        ResponseBuilder::new(StatusCode::NOT_FOUND)
            .sized_body(Bytes::new())
            .build()
    }

    /// 500 carrying a human-readable reason
    pub fn internal_error(reason: &str) -> Self {
        ResponseBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
            .header("Content-Type", "text/plain")
            .sized_body(reason.to_string())
            .build()
    }

    /// Get a header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get content-type header
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Declared Content-Length, if any
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.parse().ok())
    }

    /// Replace (or add) a header
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    /// Convert into a hyper response
    ///
    /// Headers hyper refuses (invalid names or values) are dropped.
    pub fn into_hyper(self) -> hyper::Response<HyperBody> {
        let mut res = hyper::Response::new(self.body.into_hyper());
        *res.status_mut() = hyper::StatusCode::from_u16(self.status.as_u16())
            .unwrap_or(hyper::StatusCode::INTERNAL_SERVER_ERROR);

        let headers = res.headers_mut();
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::debug!(header = %name, "Dropping invalid response header"),
            }
        }

        res
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

/// Builder for constructing responses
pub struct ResponseBuilder {
    response: Response,
}

impl ResponseBuilder {
    /// Create a new builder
    pub fn new(status: StatusCode) -> Self {
        Self {
            response: Response::new(status),
        }
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response.headers.push((name.into(), value.into()));
        self
    }

    /// `Access-Control-Allow-Origin: *`
    pub fn allow_any_origin(self) -> Self {
        self.header("Access-Control-Allow-Origin", "*")
    }

    /// Set a materialised body and declare its length
    pub fn sized_body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.response.set_header("Content-Length", body.len().to_string());
        self.response.body = Body::Full(body);
        self
    }

    /// Set a streamed body of exactly `len` bytes
    pub fn stream_body(mut self, len: u64, stream: PayloadStream) -> Self {
        self.response.set_header("Content-Length", len.to_string());
        self.response.body = Body::Stream(stream);
        self
    }

    /// Build the response
    pub fn build(self) -> Response {
        self.response
    }
}
