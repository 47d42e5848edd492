//! Error types for speedo-core

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for speedo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the measurement server
#[derive(Debug, Error)]
pub enum Error {
    /// Requested asset or result artifact is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request body is not valid JSON
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Result persistence failed
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Body too large
    #[error("Body too large: {size} bytes exceeds limit of {limit} bytes")]
    BodyTooLarge { size: usize, limit: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Hyper error
    #[error("HTTP error: {0}")]
    Hyper(String),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(String),

    /// Configured web root does not exist
    #[error("The web folder does not exist: {}", .0.display())]
    WebRootMissing(PathBuf),

    /// Listener could not bind its port
    #[error("Server failed listening on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Invalid listen address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Geolocation lookup failed
    #[error("Geolocation lookup failed: {0}")]
    Geo(String),
}

impl Error {
    /// Whether this error means "the thing asked for is not there"
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<hyper::Error> for Error {
    fn from(e: hyper::Error) -> Self {
        Error::Hyper(e.to_string())
    }
}
