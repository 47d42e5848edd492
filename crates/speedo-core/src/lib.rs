//! speedo-core: Speed-test measurement server core
//!
//! Request dispatch and measurement-data transfer for a browser-based
//! speed test: streamed download payloads, upload draining, JSON result
//! storage, static client assets and a WebSocket latency channel, served
//! identically over plaintext and TLS listeners.
//!
//! ## Features
//! - `compress` - Compression of static assets (gzip, brotli, deflate)

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod compress;
pub mod config;
pub mod content_type;
pub mod dispatch;
pub mod error;
pub mod geo;
pub mod handlers;
pub mod latency;
pub mod payload;
pub mod request;
pub mod response;
pub mod server;
pub mod store;
pub mod tls;

// Re-exports
pub use config::ServerConfig;
pub use dispatch::{Collaborators, Dispatcher, Route};
pub use error::{Error, Result};
pub use request::{Request, RequestBody, RequestBuilder};
pub use response::{Body, Response, ResponseBuilder, StatusCode};
pub use server::{ConnectionTracker, Server};
pub use tls::TlsConfig;

pub use geo::{GeoResolver, HttpGeoResolver, NoGeo};
pub use latency::{EchoChannel, LatencyChannel};
pub use payload::{BlockPayload, PayloadGenerator, PayloadStream};
pub use store::{FsResultStore, ResultStore};
