//! Client IP extraction and bucketing.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::HeaderMap;

use crate::ratelimit::constants::IPV6_PREFIX_SEGMENTS;

/// First parseable address of a proxy header.
fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Resolve the client address of a request.
///
/// With `trust_proxy`, the first `X-Forwarded-For` hop wins, then
/// `X-Real-IP`. Otherwise (or when neither parses) the peer address is
/// used, falling back to loopback when there is no connection info.
pub fn extract_client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_proxy: bool,
) -> IpAddr {
    trust_proxy
        .then(|| header_ip(headers, "X-Forwarded-For").or_else(|| header_ip(headers, "X-Real-IP")))
        .flatten()
        .or_else(|| connect_info.map(|c| c.0.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Bucket key for an address.
///
/// IPv4 is used verbatim. IPv6 is cut to its /64 so one allocation counts as
/// one client.
pub fn normalize_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return v4.to_string();
            }
            let prefix: Vec<String> = v6.segments()[..IPV6_PREFIX_SEGMENTS]
                .iter()
                .map(|seg| format!("{seg:x}"))
                .collect();
            format!("{}::/64", prefix.join(":"))
        }
    }
}
