//! Compression negotiation for static assets
//!
//! Supports brotli, gzip and deflate. The encoded body is only sent when it
//! is smaller than the plain one.

use crate::Response;
use bytes::Bytes;

/// Compression encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Gzip,
    Brotli,
    Deflate,
    Identity,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Gzip => "gzip",
            Encoding::Brotli => "br",
            Encoding::Deflate => "deflate",
            Encoding::Identity => "identity",
        }
    }

    /// Pick from an Accept-Encoding header
    ///
    /// Priority: br > gzip > deflate > identity. Codings listed with
    /// `q=0` are refused.
    pub fn from_accept_encoding(header: &str) -> Self {
        let accepted: Vec<&str> = header
            .split(',')
            .filter_map(|item| {
                let mut parts = item.split(';');
                let coding = parts.next()?.trim();
                let refused = parts.any(|p| {
                    p.trim()
                        .strip_prefix("q=")
                        .and_then(|q| q.trim().parse::<f32>().ok())
                        .map(|q| q <= 0.0)
                        .unwrap_or(false)
                });
                (!refused && !coding.is_empty()).then_some(coding)
            })
            .collect();

        let has = |name: &str| accepted.iter().any(|c| c.eq_ignore_ascii_case(name));
        if has("br") {
            Encoding::Brotli
        } else if has("gzip") {
            Encoding::Gzip
        } else if has("deflate") {
            Encoding::Deflate
        } else {
            Encoding::Identity
        }
    }
}

#[cfg_attr(not(feature = "compress"), allow(dead_code))]
const GZIP_LEVEL: u32 = 6;
#[cfg_attr(not(feature = "compress"), allow(dead_code))]
const BROTLI_QUALITY: i32 = 4;

/// Bodies below this size are sent as-is
const MIN_SIZE: usize = 1024;

/// Compression negotiator
#[derive(Debug, Clone, Default)]
pub struct Compress;

impl Compress {
    pub fn new() -> Self {
        Self
    }

    fn should_compress(&self, content_type: &str, size: usize) -> bool {
        if size < MIN_SIZE {
            return false;
        }

        content_type.starts_with("text/")
            || content_type.contains("json")
            || content_type.contains("xml")
            || content_type.contains("javascript")
            || content_type.starts_with("font/ttf")
            || content_type.starts_with("font/eot")
    }

    /// Encode `body` if the client accepts it and it pays off
    pub fn negotiate(
        &self,
        accept_encoding: &str,
        content_type: &str,
        body: &[u8],
    ) -> Option<(Encoding, Bytes)> {
        if accept_encoding.is_empty() || !self.should_compress(content_type, body.len()) {
            return None;
        }

        let encoding = Encoding::from_accept_encoding(accept_encoding);
        let compressed = match encoding {
            Encoding::Gzip => self.compress_gzip(body),
            Encoding::Brotli => self.compress_brotli(body),
            Encoding::Deflate => self.compress_deflate(body),
            Encoding::Identity => return None,
        };

        match compressed {
            Ok(data) if data.len() < body.len() => Some((encoding, Bytes::from(data))),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(encoding = encoding.as_str(), error = %e, "Compression failed");
                None
            }
        }
    }

    /// Apply negotiation to a fully materialised response
    ///
    /// Content-Length is rewritten to the encoded size so the declared
    /// length always matches the bytes on the wire.
    pub fn apply(&self, accept_encoding: &str, res: &mut Response) {
        let content_type = res.content_type().unwrap_or("").to_string();
        let Some(body) = res.body.as_bytes() else {
            return;
        };

        if let Some((encoding, data)) = self.negotiate(accept_encoding, &content_type, body) {
            res.set_header("Content-Encoding", encoding.as_str());
            res.set_header("Vary", "Accept-Encoding");
            res.set_header("Content-Length", data.len().to_string());
            res.body = crate::Body::Full(data);
        }
    }

    #[cfg(feature = "compress")]
    fn compress_gzip(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(GZIP_LEVEL));
        encoder.write_all(data)?;
        encoder.finish()
    }

    #[cfg(feature = "compress")]
    fn compress_brotli(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut output = Vec::new();
        let params = brotli::enc::BrotliEncoderParams {
            quality: BROTLI_QUALITY,
            ..Default::default()
        };
        brotli::enc::BrotliCompress(&mut std::io::Cursor::new(data), &mut output, &params)?;
        Ok(output)
    }

    #[cfg(feature = "compress")]
    fn compress_deflate(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        use flate2::write::DeflateEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(GZIP_LEVEL));
        encoder.write_all(data)?;
        encoder.finish()
    }

    // Without the codecs every body goes out as identity
    #[cfg(not(feature = "compress"))]
    fn compress_gzip(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    #[cfg(not(feature = "compress"))]
    fn compress_brotli(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    #[cfg(not(feature = "compress"))]
    fn compress_deflate(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ResponseBuilder, StatusCode};

    #[test]
    fn test_encoding_parse() {
        assert_eq!(Encoding::from_accept_encoding("gzip, deflate, br"), Encoding::Brotli);
        assert_eq!(Encoding::from_accept_encoding("gzip, deflate"), Encoding::Gzip);
        assert_eq!(Encoding::from_accept_encoding("deflate"), Encoding::Deflate);
        assert_eq!(Encoding::from_accept_encoding(""), Encoding::Identity);
        assert_eq!(Encoding::from_accept_encoding("br;q=0, gzip;q=0.8"), Encoding::Gzip);
        assert_eq!(Encoding::from_accept_encoding("identity"), Encoding::Identity);
    }

    #[test]
    fn test_should_compress() {
        let compress = Compress::new();

        assert!(compress.should_compress("text/html", 2000));
        assert!(compress.should_compress("application/javascript", 2000));
        assert!(!compress.should_compress("image/png", 2000));
        assert!(!compress.should_compress("font/woff2", 2000));
        assert!(!compress.should_compress("text/html", 500)); // Too small
    }

    #[cfg(feature = "compress")]
    #[test]
    fn test_apply_rewrites_length() {
        let body = "body { margin: 0; }\n".repeat(200);
        let mut res = ResponseBuilder::new(StatusCode::OK)
            .header("Content-Type", "text/css")
            .sized_body(body.clone())
            .build();

        Compress::new().apply("gzip", &mut res);

        assert_eq!(res.header("content-encoding"), Some("gzip"));
        assert_eq!(res.header("vary"), Some("Accept-Encoding"));
        let sent = res.body.as_bytes().unwrap().len() as u64;
        assert!(sent < body.len() as u64);
        assert_eq!(res.content_length(), Some(sent));
    }

    #[test]
    fn test_apply_without_accept_encoding() {
        let mut res = ResponseBuilder::new(StatusCode::OK)
            .header("Content-Type", "text/css")
            .sized_body("a".repeat(4096))
            .build();

        Compress::new().apply("", &mut res);

        assert_eq!(res.header("content-encoding"), None);
        assert_eq!(res.content_length(), Some(4096));
    }
}
