//! Result store gateway
//!
//! `POST /save` persists a JSON result and answers with its identifier;
//! `/results/<file>` serves stored artifacts back.

use crate::content_type::result_content_type;
use crate::store::ResultStore;
use crate::{Error, Request, Response, ResponseBuilder, Result, StatusCode};
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;

/// Prefix of artifact lookups
pub const RESULTS_PREFIX: &str = "/results/";

#[derive(Clone)]
pub struct Results {
    store: Arc<dyn ResultStore>,
    max_body: usize,
}

impl Results {
    pub fn new(store: Arc<dyn ResultStore>, max_body: usize) -> Self {
        Self { store, max_body }
    }

    /// Accept a JSON document and return its identifier
    ///
    /// Malformed JSON is answered with 500 just like a storage failure;
    /// clients only distinguish success from failure.
    pub async fn save(&self, mut req: Request) -> Response {
        match self.persist(req.take_body().read_to_end(self.max_body).await).await {
            Ok(id) => ResponseBuilder::new(StatusCode::OK)
                .allow_any_origin()
                .header("Content-Type", "text/plain")
                .sized_body(id)
                .build(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to save result");
                Response::internal_error(&e.to_string())
            }
        }
    }

    async fn persist(&self, body: Result<Bytes>) -> Result<String> {
        let document: Value = serde_json::from_slice(&body?)?;
        self.store
            .store(document)
            .await
            .map_err(|e| match e {
                Error::Persistence(_) => e,
                other => Error::Persistence(other.to_string()),
            })
    }

    /// Serve a stored artifact by file name
    pub async fn fetch(&self, req: &Request) -> Response {
        let filename = artifact_name(&req.path);

        match self.store.read(filename).await {
            Ok(data) => {
                let mut builder = ResponseBuilder::new(StatusCode::OK);
                if let Some(content_type) = result_content_type(filename) {
                    builder = builder.header("Content-Type", content_type);
                }
                builder.sized_body(data).build()
            }
            Err(e) => {
                if !e.is_not_found() {
                    tracing::debug!(file = filename, error = %e, "Failed to read result");
                }
                Response::not_found_empty()
            }
        }
    }
}

/// Trailing segment of a `/results/...` path
pub fn artifact_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}
