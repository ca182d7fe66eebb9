use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, Extensions, HeaderMap},
};

use crate::core::error::AppError;

/// Whether `X-Forwarded-For` may be trusted for the uploader identity.
/// Inserted as a request extension by the image routes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardedForPolicy {
    pub trusted: bool,
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Identity an upload is counted against: the client IP as a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

impl ClientIdentity {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve the identity from request headers and extensions
    pub fn resolve(headers: &HeaderMap, extensions: &Extensions, trust_forwarded_for: bool) -> Self {
        if trust_forwarded_for {
            if let Some(ip) = forwarded_for(headers) {
                return Self(ip);
            }
        }

        let peer = extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Self(peer.unwrap_or_else(|| Self::UNKNOWN.to_string()))
    }
}

impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let policy = parts
            .extensions
            .get::<ForwardedForPolicy>()
            .copied()
            .unwrap_or_default();

        Ok(Self::resolve(&parts.headers, &parts.extensions, policy.trusted))
    }
}
