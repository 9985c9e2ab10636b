pub mod health;
pub mod thirdlogin;

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;

const CLIENT_IP_HEADERS: &[&str] = &["x-forwarded-for", "x-real-ip"];

/// Best guess at the caller's public IP.
///
/// Proxy headers first (first entry of `X-Forwarded-For`), then the socket
/// peer, then localhost.
pub fn client_ip(request: &Request) -> String {
    header_ip(request.headers())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
        .map_or_else(|| "127.0.0.1".to_string(), |ip| ip.to_string())
}

fn header_ip(headers: &HeaderMap) -> Option<IpAddr> {
    CLIENT_IP_HEADERS.iter().find_map(|name| {
        let value = headers.get(*name)?.to_str().ok()?;
        value.split(',').next()?.trim().parse().ok()
    })
}
