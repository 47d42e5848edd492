//! Content-type resolution for static assets and stored results

use std::path::Path;

/// Content type of a static asset, `text/plain` when unmapped
pub fn asset_content_type(path: impl AsRef<Path>) -> &'static str {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match ext {
        "css" => "text/css",
        "eot" => "font/eot",
        "html" => "text/html",
        "js" => "application/javascript",
        "svg" => "image/svg+xml",
        "ttf" => "font/ttf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "text/plain",
    }
}

/// Content type of a stored result artifact, `None` when unknown
///
/// The extension is whatever follows the last `.` of the file name.
pub fn result_content_type(filename: &str) -> Option<&'static str> {
    let ext = filename.rsplit('.').next().unwrap_or("");
    match ext {
        "svg" => Some("image/svg+xml"),
        "png" => Some("image/png"),
        "json" => Some("application/json"),
        _ => None,
    }
}
