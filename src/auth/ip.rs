//! Client IP extraction for rate limiting.

use std::net::SocketAddr;

use axum::{extract::ConnectInfo, http::request::Parts};

/// Header consulted when the server runs behind a trusted proxy.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Trait for types that provide access to HTTP headers and extensions.
/// Implemented for both `Parts` and `Request` to allow flexible IP extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &axum::http::HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &axum::http::Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Extract the client IP.
///
/// With `trust_proxy`, the first address in `X-Forwarded-For` wins. Otherwise
/// (or when the header is absent) the socket address from `ConnectInfo` is
/// used. Requests with neither share the `"unknown"` key.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(source: &T, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = source
            .headers()
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    source
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
