//! Client IP extraction.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Where the client address is read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClientIpSource {
    /// The peer address of the TCP connection.
    #[default]
    Socket,
    /// The first entry of `X-Forwarded-For`, set by a trusted reverse proxy.
    ForwardedFor,
}

fn first_forwarded_for(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(FORWARDED_FOR)?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    first.parse::<IpAddr>().ok().map(|ip| ip.to_string())
}

/// Extract the client IP address according to `source`.
///
/// With `ForwardedFor` a missing or malformed header yields `None`; there is no
/// fallback to the socket address, which would be the proxy's.
pub fn extract_client_ip(request: &Request, source: ClientIpSource) -> Option<String> {
    match source {
        ClientIpSource::ForwardedFor => first_forwarded_for(request.headers()),
        ClientIpSource::Socket => request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string()),
    }
}
