//! Static asset serving
//!
//! Serves the client application from the web root. In-app routes
//! (virtual page prefixes) resolve to the root document so the client-side
//! router can take over.

use crate::compress::Compress;
use crate::content_type::asset_content_type;
use crate::{Request, Response, ResponseBuilder, StatusCode};
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tokio::io::AsyncReadExt;

/// Document served for `/` and virtual pages
pub const INDEX_FILE: &str = "index.html";

/// Application routes rendered client-side
pub const VIRTUAL_PAGE_PREFIXES: &[&str] =
    &["/about", "/result", "/results", "/run", "/share", "/settings"];

/// Static asset configuration
#[derive(Debug, Clone)]
pub struct StaticFileConfig {
    /// Root directory
    pub root: PathBuf,
    /// Prefixes rewritten to the index document
    pub virtual_prefixes: Vec<String>,
    /// Compression negotiator
    pub compress: Compress,
}

impl StaticFileConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            virtual_prefixes: VIRTUAL_PAGE_PREFIXES.iter().map(|p| p.to_string()).collect(),
            compress: Compress::new(),
        }
    }
}

/// Outcome of reading one asset
enum Loaded {
    Missing,
    File { content: Vec<u8>, modified: Option<SystemTime> },
}

/// Static asset handler
#[derive(Debug, Clone)]
pub struct StaticFiles {
    config: StaticFileConfig,
}

impl StaticFiles {
    pub fn new(config: StaticFileConfig) -> Self {
        Self { config }
    }

    /// Serve static files from directory
    pub fn serve(root: impl Into<PathBuf>) -> Self {
        Self::new(StaticFileConfig::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Map a request path to a file under the root
    ///
    /// `None` means the path can never name an asset (traversal).
    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        let is_page = path == "/"
            || self
                .config
                .virtual_prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()));

        let relative = if is_page {
            PathBuf::from(INDEX_FILE)
        } else {
            sanitize_path(path)?
        };

        Some(self.config.root.join(relative))
    }

    /// Handle request for a static asset
    pub async fn handle(&self, req: &Request) -> Response {
        let Some(full_path) = self.resolve(&req.path) else {
            return Response::not_found();
        };

        match load(&full_path).await {
            Ok(Loaded::Missing) => Response::not_found(),
            Ok(Loaded::File { content, modified }) => {
                let mut builder = ResponseBuilder::new(StatusCode::OK)
                    .header("Content-Type", asset_content_type(&full_path));
                if let Some(modified) = modified {
                    builder = builder.header("Last-Modified", http_date(modified));
                }
                let mut res = builder.sized_body(content).build();

                let accept = req.header("accept-encoding").unwrap_or("");
                self.config.compress.apply(accept, &mut res);
                res
            }
            Err(e) => {
                tracing::error!(path = %full_path.display(), error = %e, "Failed to read asset");
                Response::internal_error(&e.to_string())
            }
        }
    }
}

/// Open once, then stat and read through the same handle
///
/// A file removed after the open is still read in full; a failure after
/// the open is a read error rather than a missing asset.
async fn load(path: &Path) -> std::io::Result<Loaded> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Loaded::Missing),
        Err(e) => return Err(e),
    };

    let meta = file.metadata().await?;
    if meta.is_dir() {
        return Ok(Loaded::Missing);
    }

    let mut content = Vec::with_capacity(meta.len() as usize);
    file.read_to_end(&mut content).await?;

    Ok(Loaded::File {
        content,
        modified: meta.modified().ok(),
    })
}

/// Sanitize request path to prevent directory traversal
fn sanitize_path(path: &str) -> Option<PathBuf> {
    let path = path.trim_start_matches('/');

    let mut result = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(c) => result.push(c),
            Component::ParentDir => return None, // Prevent ../
            _ => {}
        }
    }

    Some(result)
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn http_date(time: SystemTime) -> String {
    let dt: DateTime<Utc> = time.into();
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
