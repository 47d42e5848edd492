//! Command-line arguments
//!
//! Every flag can also be set through a `SPEEDO_*` environment variable.

use clap::Parser;
use speedo_core::config::DEFAULT_MAX_SAVE_BODY;
use speedo_core::{ServerConfig, TlsConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "speedo")]
#[command(version)]
#[command(about = "Speed-test measurement server", long_about = None)]
pub struct CliArgs {
    /// Interface to bind both listeners to
    #[arg(long, env = "SPEEDO_HOSTNAME", default_value = "0.0.0.0")]
    pub hostname: String,

    /// Plaintext HTTP port
    #[arg(long, env = "SPEEDO_HTTP_PORT", default_value_t = 8080)]
    pub http_port: u16,

    /// TLS port
    #[arg(long, env = "SPEEDO_HTTPS_PORT", default_value_t = 8443)]
    pub https_port: u16,

    /// Directory holding the client application
    #[arg(long, env = "SPEEDO_WEB_ROOT", default_value = "web")]
    pub web_root: PathBuf,

    /// Directory for stored results
    #[arg(long, env = "SPEEDO_RESULTS_DIR", default_value = "results")]
    pub results_dir: PathBuf,

    /// PEM certificate chain for the TLS listener
    #[arg(long, env = "SPEEDO_CERT", default_value = "certificates/localhost.pem")]
    pub cert: PathBuf,

    /// PEM private key for the TLS listener
    #[arg(long, env = "SPEEDO_KEY", default_value = "certificates/localhost.key")]
    pub key: PathBuf,

    /// Geolocation endpoint, `{ip}` is replaced by the client address
    #[arg(long, env = "SPEEDO_GEO_ENDPOINT")]
    pub geo_endpoint: Option<String>,

    /// Largest accepted result upload in bytes
    #[arg(long, env = "SPEEDO_MAX_SAVE_BODY", default_value_t = DEFAULT_MAX_SAVE_BODY)]
    pub max_save_body: usize,

    /// Seconds shutdown waits for open connections (0 skips the wait)
    #[arg(long, env = "SPEEDO_DRAIN_TIMEOUT", default_value_t = 5)]
    pub drain_timeout: u64,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long, env = "SPEEDO_WORKERS")]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SPEEDO_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl CliArgs {
    pub fn into_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            hostname: self.hostname,
            http_port: self.http_port,
            https_port: self.https_port,
            web_root: self.web_root,
            results_dir: self.results_dir,
            tls: TlsConfig::new(self.cert, self.key),
            geo_endpoint: self.geo_endpoint,
            max_save_body: self.max_save_body,
            workers: self.workers.filter(|&w| w > 0).unwrap_or(defaults.workers),
            drain_timeout: Duration::from_secs(self.drain_timeout),
        }
    }
}
