//! Client IP geolocation
//!
//! Lookups are best effort: callers fall back to the bare address when a
//! resolver fails.

use crate::{Error, Result};
use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use http_body_util::{BodyExt, Empty};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::{Map, Value};
use std::net::IpAddr;
use std::time::Duration;

/// Geolocation fields keyed by name
pub type GeoInfo = Map<String, Value>;

/// Geolocation collaborator
pub trait GeoResolver: Send + Sync {
    fn lookup(&self, ip: IpAddr) -> BoxFuture<'_, Result<GeoInfo>>;
}

/// Resolver that knows nothing; every lookup fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeo;

impl GeoResolver for NoGeo {
    fn lookup(&self, ip: IpAddr) -> BoxFuture<'_, Result<GeoInfo>> {
        async move { Err(Error::Geo(format!("no resolver configured for {}", ip))) }.boxed()
    }
}

/// Resolver querying a plain-HTTP JSON endpoint
///
/// The endpoint is a URL template where `{ip}` is replaced by the client
/// address, e.g. `http://ip-api.com/json/{ip}`.
pub struct HttpGeoResolver {
    template: String,
    timeout: Duration,
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl HttpGeoResolver {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            timeout: Duration::from_secs(2),
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// URL for one lookup
    pub fn url_for(&self, ip: IpAddr) -> String {
        self.template.replace("{ip}", &ip.to_string())
    }

    async fn fetch(&self, ip: IpAddr) -> Result<GeoInfo> {
        let uri: hyper::Uri = self
            .url_for(ip)
            .parse()
            .map_err(|e| Error::Geo(format!("invalid endpoint: {}", e)))?;

        let res = tokio::time::timeout(self.timeout, self.client.get(uri))
            .await
            .map_err(|_| Error::Geo("timed out".to_string()))?
            .map_err(|e| Error::Geo(e.to_string()))?;

        if !res.status().is_success() {
            return Err(Error::Geo(format!("endpoint answered {}", res.status())));
        }

        let body = tokio::time::timeout(self.timeout, res.into_body().collect())
            .await
            .map_err(|_| Error::Geo("timed out".to_string()))??
            .to_bytes();

        parse_info(&body)
    }
}

impl GeoResolver for HttpGeoResolver {
    fn lookup(&self, ip: IpAddr) -> BoxFuture<'_, Result<GeoInfo>> {
        self.fetch(ip).boxed()
    }
}

/// Parse an endpoint answer; anything but a JSON object is an error
fn parse_info(body: &[u8]) -> Result<GeoInfo> {
    match serde_json::from_slice::<Value>(body)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Geo(format!("expected an object, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_geo_fails() {
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        assert!(matches!(NoGeo.lookup(ip).await, Err(Error::Geo(_))));
    }

    #[tokio::test]
    async fn test_url_template() {
        let resolver = HttpGeoResolver::new("http://geo.local/json/{ip}?fields=country");
        let ip: IpAddr = "198.51.100.1".parse().unwrap();
        assert_eq!(
            resolver.url_for(ip),
            "http://geo.local/json/198.51.100.1?fields=country"
        );
    }

    #[test]
    fn test_parse_info() {
        let info = parse_info(br#"{"country":"NL","city":"Delft"}"#).unwrap();
        assert_eq!(info.get("country"), Some(&Value::String("NL".into())));
        assert!(parse_info(b"[1,2]").is_err());
        assert!(parse_info(b"nope").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails() {
        // Port 9 on loopback: nothing listens, the connect is refused
        let resolver = HttpGeoResolver::new("http://127.0.0.1:9/{ip}")
            .timeout(Duration::from_millis(500));
        let ip: IpAddr = "192.0.2.1".parse().unwrap();
        assert!(resolver.lookup(ip).await.is_err());
    }
}
