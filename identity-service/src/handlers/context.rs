//! Request-side device information.

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::SocketAddr;

use crate::models::{DeviceContext, DeviceHints};
use crate::services::build_device_context;

pub const DEVICE_ID_HEADER: &str = "x-device-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Client address, user agent and `X-Device-Id` of the current request.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_id: Option<String>,
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ClientInfo {
    pub fn from_parts(parts: &Parts) -> Self {
        // First hop of X-Forwarded-For, then the socket peer
        let forwarded = header_str(&parts.headers, FORWARDED_FOR_HEADER)
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .filter(|ip| !ip.is_empty());
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Self {
            ip_address: forwarded.or(peer),
            user_agent: header_str(&parts.headers, header::USER_AGENT.as_str()),
            device_id: header_str(&parts.headers, DEVICE_ID_HEADER),
        }
    }

    /// Body hints win over headers.
    pub fn device_context(&self, hints: Option<&DeviceHints>) -> DeviceContext {
        let empty = DeviceHints::default();
        build_device_context(
            self.device_id.as_deref(),
            self.ip_address.as_deref(),
            self.user_agent.as_deref(),
            hints.unwrap_or(&empty),
        )
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_reads_forwarded_for_and_device_header() {
        let p = parts(
            Request::builder()
                .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
                .header("user-agent", "Mozilla/5.0 (Linux; Android 14) Mobile")
                .header("x-device-id", "d1"),
        );
        let info = ClientInfo::from_parts(&p);
        assert_eq!(info.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(info.device_id.as_deref(), Some("d1"));

        let ctx = info.device_context(None);
        assert_eq!(ctx.device_id, "d1");
        assert_eq!(ctx.operating_system, "Android");
        assert_eq!(ctx.platform, "Mobile");
    }

    #[test]
    fn test_peer_address_fallback() {
        let mut p = parts(Request::builder());
        p.extensions
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 5000))));
        assert_eq!(ClientInfo::from_parts(&p).ip_address.as_deref(), Some("192.0.2.1"));
    }

    #[test]
    fn test_body_hints_override_header_device() {
        let p = parts(Request::builder().header("x-device-id", "header-device"));
        let hints = DeviceHints {
            device_id: Some("body-device".to_string()),
            ..DeviceHints::default()
        };
        let ctx = ClientInfo::from_parts(&p).device_context(Some(&hints));
        assert_eq!(ctx.device_id, "body-device");
    }
}
