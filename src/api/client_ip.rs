//! Client IP and origin extraction from HTTP headers
//!
//! The client IP is taken from `X-Real-IP`, then `X-Forwarded-For`, then the
//! socket peer address. A forwarding chain is kept whole so the resolver can
//! fall back along it; only a port on its first segment is removed.

use axum::http::{header::ORIGIN, HeaderMap};
use std::net::{IpAddr, SocketAddr};

const X_REAL_IP: &str = "x-real-ip";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Extract the client IP (or forwarding chain) for a request
///
/// # Arguments
/// * `headers` - HTTP request headers
/// * `socket_ip` - The socket remote address (fallback)
/// * `trust_proxy_headers` - Whether forwarding headers may be used at all
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_ip: IpAddr,
    trust_proxy_headers: bool,
) -> String {
    if trust_proxy_headers {
        let forwarded = header_value(headers, X_REAL_IP)
            .or_else(|| header_value(headers, X_FORWARDED_FOR));
        if let Some(value) = forwarded {
            let stripped = strip_port(value);
            if !stripped.is_empty() {
                return stripped;
            }
        }
    }

    socket_ip.to_string()
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Remove a port from the first segment of an IP list.
///
/// `1.2.3.4:5678, 5.6.7.8` becomes `1.2.3.4,5.6.7.8` and `[::1]:80`
/// becomes `::1`. Anything after a single colon is dropped even when it is
/// not a valid port. Empty segments are dropped.
pub fn strip_port(value: &str) -> String {
    let mut segments = value.split(',').map(str::trim).filter(|s| !s.is_empty());

    let Some(first) = segments.next() else {
        return String::new();
    };
    let first = match first.parse::<SocketAddr>() {
        Ok(addr) => addr.ip().to_string(),
        // IPv4 with a malformed port; bare IPv6 has more than one colon
        Err(_) => match first.split_once(':') {
            Some((host, port)) if !port.contains(':') => host.to_string(),
            _ => first.to_string(),
        },
    };

    std::iter::once(first)
        .chain(segments.map(str::to_string))
        .collect::<Vec<_>>()
        .join(",")
}

/// Referring domain from the `Origin` header, without scheme or path
pub fn extract_origin(headers: &HeaderMap) -> String {
    headers
        .get(ORIGIN)
        .and_then(|h| h.to_str().ok())
        .map(normalize_origin)
        .unwrap_or_default()
}

/// Drop an `http://` then an `https://` prefix and everything from the
/// first `/`.
pub fn normalize_origin(origin: &str) -> String {
    let origin = origin.strip_prefix("http://").unwrap_or(origin);
    let origin = origin.strip_prefix("https://").unwrap_or(origin);
    origin.split('/').next().unwrap_or_default().to_string()
}
