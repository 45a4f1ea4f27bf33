//! Best-effort client address resolution
//!
//! Sources are tried in order:
//! 1. `x-forwarded-for` (first hop)
//! 2. `cf-connecting-ip`
//! 3. transport peer address
//! 4. `x-real-ip`
//! 5. RFC 7239 `forwarded: for=`
//!
//! and fall back to [`UNKNOWN_IP`].

use axum::http::HeaderMap;
use std::net::SocketAddr;

pub const UNKNOWN_IP: &str = "Unknown";

pub fn resolve_source_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| non_blank(v.split(',').next().unwrap_or_default()))
        .or_else(|| header_str(headers, "cf-connecting-ip"))
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .or_else(|| header_str(headers, "x-real-ip").map(str::to_string))
        .or_else(|| header_str(headers, "forwarded").and_then(forwarded_for))
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(non_blank)
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// `for=` of the first element of a `Forwarded` header
fn forwarded_for(header: &str) -> Option<String> {
    let first = header.split(',').next()?;
    let node = first.split(';').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        key.trim().eq_ignore_ascii_case("for").then(|| value.trim())
    })?;

    let node = node.trim_matches('"');
    let host = match node.strip_prefix('[') {
        // "[2001:db8::1]:4711"
        Some(rest) => rest.split(']').next()?,
        None => node.split(':').next()?,
    };

    non_blank(host).map(str::to_string)
}
