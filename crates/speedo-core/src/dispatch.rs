//! Request dispatch
//!
//! Classifies each request against an ordered route table and hands it to
//! exactly one handler. Every outcome, failures included, is a response.

use crate::geo::{GeoResolver, HttpGeoResolver, NoGeo};
use crate::handlers::{IpInfo, Measure, Results, StaticFiles, RESULTS_PREFIX};
use crate::payload::{BlockPayload, PayloadGenerator};
use crate::store::{FsResultStore, ResultStore};
use crate::{Body, Request, Response, Result, ServerConfig};
use http::Method;
use speedo_router::{MethodFilter, PathPredicate, RouteTable};
use std::sync::Arc;
use std::time::Instant;

/// Handler a request is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Ip,
    Ping,
    Upload,
    Download,
    Save,
    Results,
    Static,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Ip => "ip",
            Route::Ping => "ping",
            Route::Upload => "upload",
            Route::Download => "download",
            Route::Save => "save",
            Route::Results => "results",
            Route::Static => "static",
        }
    }
}

/// Externally supplied services, built once at startup
#[derive(Clone)]
pub struct Collaborators {
    pub payload: Arc<dyn PayloadGenerator>,
    pub store: Arc<dyn ResultStore>,
    pub geo: Arc<dyn GeoResolver>,
}

impl Collaborators {
    pub fn new(
        payload: Arc<dyn PayloadGenerator>,
        store: Arc<dyn ResultStore>,
        geo: Arc<dyn GeoResolver>,
    ) -> Self {
        Self { payload, store, geo }
    }

    /// Default services for a configuration
    ///
    /// Creates the results directory if it is missing.
    pub async fn from_config(config: &ServerConfig) -> Result<Self> {
        let store = FsResultStore::open(config.results_dir.clone()).await?;
        let geo: Arc<dyn GeoResolver> = match &config.geo_endpoint {
            Some(endpoint) => Arc::new(HttpGeoResolver::new(endpoint.clone())),
            None => Arc::new(NoGeo),
        };

        Ok(Self {
            payload: Arc::new(BlockPayload::default()),
            store: Arc::new(store),
            geo,
        })
    }
}

fn route_table() -> RouteTable<Route> {
    RouteTable::new(Route::Static)
        .route(MethodFilter::Any, PathPredicate::Exact("/ip"), Route::Ip)
        .route(MethodFilter::Any, PathPredicate::Exact("/ping"), Route::Ping)
        .route(MethodFilter::Any, PathPredicate::Exact("/upload"), Route::Upload)
        .route(MethodFilter::Any, PathPredicate::Exact("/download"), Route::Download)
        .route(MethodFilter::Only("POST"), PathPredicate::Exact("/save"), Route::Save)
        .route(MethodFilter::Any, PathPredicate::Prefix(RESULTS_PREFIX), Route::Results)
}

/// Request dispatcher
#[derive(Clone)]
pub struct Dispatcher {
    table: Arc<RouteTable<Route>>,
    ip: IpInfo,
    measure: Measure,
    results: Results,
    assets: StaticFiles,
}

impl Dispatcher {
    pub fn new(config: &ServerConfig, collaborators: Collaborators) -> Self {
        Self {
            table: Arc::new(route_table()),
            ip: IpInfo::new(collaborators.geo),
            measure: Measure::new(collaborators.payload),
            results: Results::new(collaborators.store, config.max_save_body),
            assets: StaticFiles::serve(config.web_root.clone()),
        }
    }

    /// Directory static assets are served from
    pub fn web_root(&self) -> &std::path::Path {
        self.assets.root()
    }

    /// Route for a method and path
    pub fn classify(&self, method: &Method, path: &str) -> Route {
        self.table.find(method.as_str(), path)
    }

    /// Run the request through its handler
    pub async fn dispatch(&self, req: Request) -> Response {
        let start = Instant::now();
        let method = req.method.clone();
        let path = req.path.clone();
        tracing::debug!(method = %method, path = %path, "Received request");

        let route = self.classify(&method, &path);
        let mut res = match route {
            Route::Ip => self.ip.handle(&req).await,
            Route::Ping | Route::Upload => self.measure.acknowledge(req).await,
            Route::Download => self.measure.download(&req),
            Route::Save => self.results.save(req).await,
            Route::Results => self.results.fetch(&req).await,
            Route::Static => self.assets.handle(&req).await,
        };

        if method == Method::HEAD {
            res.body = Body::empty();
        }

        tracing::debug!(
            method = %method,
            path = %path,
            route = route.as_str(),
            status = res.status.as_u16(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Request completed"
        );
        res
    }
}
