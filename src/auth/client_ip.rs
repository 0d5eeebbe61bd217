//! Client address resolution.
//!
//! The configured proxy header (nginx `X-Real-IP` by default) wins over the
//! socket peer address. Header values that do not parse as an IP address are
//! ignored.

use axum::http::HeaderMap;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};

/// Resolve the caller's real address.
pub fn real_client_ip(
    headers: &HeaderMap,
    proxy_header: &str,
    peer: Option<SocketAddr>,
) -> Option<IpAddr> {
    let forwarded = headers
        .get(proxy_header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(raw) = forwarded {
        match raw.parse::<IpAddr>() {
            Ok(ip) => return Some(ip),
            Err(_) => tracing::debug!(header = %proxy_header, "Ignoring unparseable proxy address"),
        }
    }

    peer.map(|addr| addr.ip())
}

/// Hash an address for logs so raw client IPs are never written out.
pub fn ip_hash(ip: Option<IpAddr>) -> String {
    match ip {
        Some(ip) => {
            let mut hasher = std::hash::DefaultHasher::new();
            ip.hash(&mut hasher);
            format!("{:x}", hasher.finish())
        }
        None => "unknown".to_string(),
    }
}
