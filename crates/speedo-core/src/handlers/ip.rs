//! Client address report

use crate::geo::{GeoInfo, GeoResolver};
use crate::{Request, Response, ResponseBuilder, StatusCode};
use serde_json::Value;
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Clone)]
pub struct IpInfo {
    geo: Arc<dyn GeoResolver>,
}

impl IpInfo {
    pub fn new(geo: Arc<dyn GeoResolver>) -> Self {
        Self { geo }
    }

    /// Geolocation fields plus the client's own address under `ip`
    pub async fn handle(&self, req: &Request) -> Response {
        let ip = client_ip(req);

        let mut info = match self.geo.lookup(ip).await {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!(%ip, error = %e, "Geolocation unavailable");
                GeoInfo::new()
            }
        };
        info.insert("ip".to_string(), Value::String(ip.to_string()));

        let body = Value::Object(info).to_string();
        ResponseBuilder::new(StatusCode::OK)
            .allow_any_origin()
            .header("Content-Type", "application/json")
            .sized_body(body)
            .build()
    }
}

/// Peer address with IPv4-mapped IPv6 folded back to IPv4
pub fn client_ip(req: &Request) -> IpAddr {
    req.remote_addr.ip().to_canonical()
}
