//! Rate limit identifiers derived from request metadata.

use axum::http::{header, HeaderMap};
use std::net::SocketAddr;

/// Characters of the bearer token kept as identifier.
pub const TOKEN_SUFFIX_LEN: usize = 32;

/// Where an identifier came from. Keeps token-derived and address-derived
/// identifiers in separate namespaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientKey {
    Token(String),
    Address(String),
}

impl ClientKey {
    /// Identify the caller: a token suffix when credentials are presented,
    /// so callers behind one proxy are limited separately, else the address.
    pub fn from_request(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        if let Some(auth) = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return ClientKey::Token(token_suffix(auth).to_string());
        }
        ClientKey::Address(client_ip(headers, peer))
    }

    pub fn identifier(&self) -> String {
        match self {
            ClientKey::Token(suffix) => format!("token:{}", sanitize_key(suffix)),
            ClientKey::Address(ip) => format!("ip:{}", sanitize_key(ip)),
        }
    }
}

fn token_suffix(value: &str) -> &str {
    let token = crate::auth::bearer_token(value).unwrap_or(value);
    let skip = token.chars().count().saturating_sub(TOKEN_SUFFIX_LEN);
    match token.char_indices().nth(skip) {
        Some((idx, _)) => &token[idx..],
        None => token,
    }
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(first_ip) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return first_ip.to_string();
    }

    if let Some(real_ip) = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return real_ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Keep identifiers safe to embed in store keys. Other bytes, `%` included,
/// are percent-encoded so distinct inputs never share a key.
pub fn sanitize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b':' | b'-' | b'_' | b'.') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}
