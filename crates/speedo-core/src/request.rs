//! HTTP Request types

use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use http::Method;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Request body
///
/// Either fully buffered (tests, synthetic requests) or the transport's
/// streaming body, which is only pulled when a handler asks for it.
#[derive(Debug, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Buffered(Bytes),
    Incoming(Incoming),
}

impl RequestBody {
    /// Read the whole body, failing once more than `limit` bytes arrive
    pub async fn read_to_end(self, limit: usize) -> Result<Bytes> {
        match self {
            RequestBody::Empty => Ok(Bytes::new()),
            RequestBody::Buffered(bytes) => {
                if bytes.len() > limit {
                    return Err(Error::BodyTooLarge {
                        size: bytes.len(),
                        limit,
                    });
                }
                Ok(bytes)
            }
            RequestBody::Incoming(mut body) => {
                let mut buf = BytesMut::new();
                while let Some(frame) = body.frame().await {
                    if let Ok(data) = frame?.into_data() {
                        let size = buf.len() + data.len();
                        if size > limit {
                            return Err(Error::BodyTooLarge { size, limit });
                        }
                        buf.extend_from_slice(&data);
                    }
                }
                Ok(buf.freeze())
            }
        }
    }

    /// Consume the body without keeping it, returning the byte count
    pub async fn drain(self) -> Result<u64> {
        match self {
            RequestBody::Empty => Ok(0),
            RequestBody::Buffered(bytes) => Ok(bytes.len() as u64),
            RequestBody::Incoming(mut body) => {
                let mut total = 0u64;
                while let Some(frame) = body.frame().await {
                    if let Some(data) = frame?.data_ref() {
                        total += data.len() as u64;
                    }
                }
                Ok(total)
            }
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Buffered(bytes)
    }
}

/// HTTP Request
#[derive(Debug)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Request path (without query string)
    pub path: String,
    /// Query string (without leading ?)
    pub query: Option<String>,
    /// Request headers (stack-allocated for small header counts)
    pub headers: SmallVec<[(String, String); 16]>,
    /// Peer address of the connection
    pub remote_addr: SocketAddr,
    /// Request body
    pub body: RequestBody,
}

impl Request {
    /// Create a new request
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: SmallVec::new(),
            remote_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            body: RequestBody::Empty,
        }
    }

    /// Convert a hyper request, keeping its body as a stream
    pub fn from_hyper(req: hyper::Request<Incoming>, remote_addr: SocketAddr) -> Self {
        let (parts, body) = req.into_parts();

        let mut request = Request::new(parts.method, parts.uri.path());
        request.query = parts.uri.query().map(|s| s.to_string());
        request.remote_addr = remote_addr;
        request.body = RequestBody::Incoming(body);

        // Copy headers
        for (name, value) in &parts.headers {
            if let Ok(v) = value.to_str() {
                request.headers.push((name.to_string(), v.to_string()));
            }
        }

        request
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Take the body out, leaving an empty one behind
    pub fn take_body(&mut self) -> RequestBody {
        std::mem::take(&mut self.body)
    }

    /// Parse query string into key-value pairs
    pub fn query_params(&self) -> HashMap<String, String> {
        let mut params = HashMap::new();
        if let Some(query) = &self.query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                params.insert(urlencoding_decode(key), urlencoding_decode(value));
            }
        }
        params
    }

    /// Get a single query parameter
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_params().remove(name)
    }
}

/// Builder for constructing requests
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Create a new builder
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request: Request::new(method, path),
        }
    }

    /// Set query string
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.request.query = Some(query.into());
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push((name.into(), value.into()));
        self
    }

    /// Set peer address
    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.request.remote_addr = addr;
        self
    }

    /// Set a buffered body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.body = RequestBody::Buffered(body.into());
        self
    }

    /// Build the request
    pub fn build(self) -> Request {
        self.request
    }
}

/// Percent-decoding for query components; `+` is a space
fn urlencoding_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_header() {
        let req = RequestBuilder::new(Method::GET, "/")
            .header("Content-Type", "application/json")
            .build();

        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(req.header("accept"), None);
    }

    #[test]
    fn test_query_params() {
        let req = RequestBuilder::new(Method::GET, "/download")
            .query("size=1024&name=qux%20quux&flag&caf%C3%A9=1")
            .build();

        let params = req.query_params();
        assert_eq!(params.get("size"), Some(&"1024".to_string()));
        assert_eq!(params.get("name"), Some(&"qux quux".to_string()));
        assert_eq!(params.get("flag"), Some(&String::new()));
        assert_eq!(params.get("café"), Some(&"1".to_string()));
        assert_eq!(req.query_param("size").as_deref(), Some("1024"));
    }

    #[test]
    fn test_decode_malformed_escape() {
        assert_eq!(urlencoding_decode("100%"), "100%");
        assert_eq!(urlencoding_decode("%zz"), "%zz");
        assert_eq!(urlencoding_decode("a+b"), "a b");
    }

    #[tokio::test]
    async fn test_buffered_body() {
        let req = RequestBuilder::new(Method::POST, "/save").body("{\"a\":1}").build();
        let bytes = req.body.read_to_end(1024).await.unwrap();
        assert_eq!(&bytes[..], b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_body_limit() {
        let body = RequestBody::Buffered(Bytes::from(vec![0u8; 16]));
        let err = body.read_to_end(8).await.unwrap_err();
        assert!(matches!(err, Error::BodyTooLarge { size: 16, limit: 8 }));
    }

    #[tokio::test]
    async fn test_drain() {
        assert_eq!(RequestBody::Empty.drain().await.unwrap(), 0);
        let body = RequestBody::from(Bytes::from_static(b"0123456789"));
        assert_eq!(body.drain().await.unwrap(), 10);
    }
}
