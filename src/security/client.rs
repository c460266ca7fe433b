//! Client identity used as the rate-limiting key.
//!
//! The identity is taken from the first `X-Forwarded-For` entry when present,
//! otherwise from the socket peer. It carries no authentication weight.

use std::net::SocketAddr;

use axum::http::HeaderMap;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Rate-limiting key for one remote client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Creates an identity from a raw key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derives the identity of a request.
    #[must_use]
    pub fn from_request(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match (forwarded, peer) {
            (Some(first), _) => Self(first.to_string()),
            (None, Some(addr)) => Self(addr.ip().to_string()),
            (None, None) => Self("unknown".to_string()),
        }
    }

    /// The key as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn peer() -> Option<SocketAddr> {
        Some("10.0.0.7:51234".parse().unwrap())
    }

    #[test]
    fn forwarded_for_first_entry_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR,
            HeaderValue::from_static(" 203.0.113.9 , 10.0.0.1"),
        );
        let id = ClientIdentity::from_request(&headers, peer());
        assert_eq!(id.as_str(), "203.0.113.9");
    }

    #[test]
    fn falls_back_to_peer_ip_without_port() {
        let id = ClientIdentity::from_request(&HeaderMap::new(), peer());
        assert_eq!(id.as_str(), "10.0.0.7");
    }

    #[test]
    fn blank_forwarded_header_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("  "));
        let id = ClientIdentity::from_request(&headers, peer());
        assert_eq!(id.as_str(), "10.0.0.7");
    }

    #[test]
    fn unknown_without_any_source() {
        let id = ClientIdentity::from_request(&HeaderMap::new(), None);
        assert_eq!(id.to_string(), "unknown");
    }
}
