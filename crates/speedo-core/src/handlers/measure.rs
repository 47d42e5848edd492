//! Bandwidth and round-trip measurement endpoints
//!
//! `/download` streams a synthetic payload of the requested size.
//! `/upload` and `/ping` drain whatever the client sends and acknowledge
//! with an empty 200; the client times the exchange.

use crate::payload::PayloadGenerator;
use crate::{Request, Response, ResponseBuilder, StatusCode};
use std::sync::Arc;

/// Payload size when the client does not ask for one (8 MiB)
pub const DEFAULT_DOWNLOAD_SIZE: u64 = 8 * 1024 * 1024;

/// Measurement stream writer
#[derive(Clone)]
pub struct Measure {
    payload: Arc<dyn PayloadGenerator>,
}

impl Measure {
    pub fn new(payload: Arc<dyn PayloadGenerator>) -> Self {
        Self { payload }
    }

    /// Stream `size` bytes (query parameter) of synthetic payload
    pub fn download(&self, req: &Request) -> Response {
        let size = requested_size(req);
        tracing::debug!(size, "Streaming download payload");

        ResponseBuilder::new(StatusCode::OK)
            .allow_any_origin()
            .header("Content-Type", "application/octet-stream")
            .stream_body(size, self.payload.produce(size))
            .build()
    }

    /// Drain the request body and acknowledge
    pub async fn acknowledge(&self, mut req: Request) -> Response {
        match req.take_body().drain().await {
            Ok(received) => tracing::debug!(path = %req.path, received, "Drained request body"),
            // The client is gone; the answer goes nowhere but is still well-formed
            Err(e) => tracing::debug!(path = %req.path, error = %e, "Request body aborted"),
        }
        Response::empty_ok()
    }
}

/// `size` query parameter, falling back to the default when absent or
/// not an unsigned integer
pub fn requested_size(req: &Request) -> u64 {
    req.query_param("size")
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_DOWNLOAD_SIZE)
}
