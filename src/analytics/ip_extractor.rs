//! Client IP extraction from HTTP headers
//!
//! The service is deployed behind a trusted reverse proxy, so the proxy
//! headers are taken at face value and win over the socket address:
//!
//! 1. first entry of `X-Forwarded-For`
//! 2. `X-Real-IP`
//! 3. the peer address of the connection
//!
//! Both headers are trivially spoofable when clients can reach the service
//! directly. Keep this order unless the deployment model changes.

use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Extract the client IP address for a request
///
/// # Arguments
/// * `headers` - HTTP request headers
/// * `remote_addr` - The socket remote address (fallback)
///
/// # Returns
/// The client IP as found in the headers, or the IP part of `remote_addr`.
/// Header values are not validated as IP addresses.
pub fn extract_client_ip(headers: &HeaderMap, remote_addr: SocketAddr) -> String {
    if let Some(forwarded) = header_value(headers, "x-forwarded-for") {
        return first_forwarded_for(forwarded).to_string();
    }

    if let Some(real_ip) = header_value(headers, "x-real-ip") {
        return real_ip.to_string();
    }

    remote_addr.ip().to_string()
}

/// Non-empty, UTF-8 header value
pub(crate) fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .filter(|s| !s.is_empty())
}

/// Leftmost hop of an `X-Forwarded-For` chain, i.e. the original client
fn first_forwarded_for(value: &str) -> &str {
    value.split(',').next().unwrap_or(value).trim()
}
