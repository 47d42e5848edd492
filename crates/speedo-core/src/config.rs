//! Server configuration
//!
//! Established once at startup and shared read-only by every connection.

use crate::{Error, Result, TlsConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default cap on `/save` request bodies (1 MiB)
pub const DEFAULT_MAX_SAVE_BODY: usize = 1024 * 1024;

/// Default wait for open connections at shutdown
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface both listeners bind to
    pub hostname: String,
    /// Plaintext listener port
    pub http_port: u16,
    /// TLS listener port
    pub https_port: u16,
    /// Directory holding the client application
    pub web_root: PathBuf,
    /// Directory holding stored result artifacts
    pub results_dir: PathBuf,
    /// Certificate and key for the TLS listener
    pub tls: TlsConfig,
    /// Optional geolocation endpoint, `{ip}` is replaced by the client address
    pub geo_endpoint: Option<String>,
    /// Largest accepted `/save` body in bytes
    pub max_save_body: usize,
    /// Runtime worker threads
    pub workers: usize,
    /// How long shutdown waits for open connections to finish
    pub drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_string(),
            http_port: 8080,
            https_port: 8443,
            web_root: PathBuf::from("web"),
            results_dir: PathBuf::from("results"),
            tls: TlsConfig::new("certificates/localhost.pem", "certificates/localhost.key"),
            geo_endpoint: None,
            max_save_body: DEFAULT_MAX_SAVE_BODY,
            workers: num_cpus::get(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn new(web_root: impl Into<PathBuf>) -> Self {
        Self {
            web_root: web_root.into(),
            ..Default::default()
        }
    }

    /// Fail unless the web root is an existing directory
    pub fn check_web_root(&self) -> Result<()> {
        if self.web_root.is_dir() {
            Ok(())
        } else {
            Err(Error::WebRootMissing(self.web_root.clone()))
        }
    }

    /// Address of the plaintext listener
    pub fn http_addr(&self) -> Result<SocketAddr> {
        socket_addr(&self.hostname, self.http_port)
    }

    /// Address of the TLS listener
    pub fn https_addr(&self) -> Result<SocketAddr> {
        socket_addr(&self.hostname, self.https_port)
    }

    /// Make relative paths absolute against `base`
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        if self.web_root.is_relative() {
            self.web_root = base.join(&self.web_root);
        }
        if self.results_dir.is_relative() {
            self.results_dir = base.join(&self.results_dir);
        }
        self
    }
}

fn socket_addr(hostname: &str, port: u16) -> Result<SocketAddr> {
    // Bracket bare IPv6 literals so "::" parses
    let host = if hostname.contains(':') && !hostname.starts_with('[') {
        format!("[{}]", hostname)
    } else {
        hostname.to_string()
    };
    format!("{}:{}", host, port)
        .parse()
        .map_err(|e| Error::InvalidAddress(format!("{}:{} ({})", hostname, port, e)))
}
