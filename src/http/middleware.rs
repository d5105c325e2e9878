//! Per-request admission middleware.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{Result, WindowgateError};
use crate::ratelimit::{AdmissionBackend, ClientKey, Decision, RateLimitHeaders};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// State handed to [`rate_limit_middleware`].
pub struct GateState<B> {
    backend: Arc<B>,
    trust_forwarded_for: bool,
}

impl<B> GateState<B> {
    pub fn new(backend: Arc<B>, trust_forwarded_for: bool) -> Self {
        Self {
            backend,
            trust_forwarded_for,
        }
    }
}

impl<B> Clone for GateState<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            trust_forwarded_for: self.trust_forwarded_for,
        }
    }
}

/// Admit or reject a request before it reaches the inner router.
///
/// Admitted requests get the long-window `X-RateLimit-*` headers added to
/// the handler's response. Rejected ones are answered with 429 and a JSON
/// `{ "message": ... }` body. Requests without a usable client key get 400.
pub async fn rate_limit_middleware<B: AdmissionBackend + 'static>(
    State(gate): State<GateState<B>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);

    let client = match resolve_client_key(gate.trust_forwarded_for, request.headers(), peer) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Rejecting request without a usable client key");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": e.to_string() })),
            )
                .into_response();
        }
    };

    let decision = gate.backend.admit(&client).await;

    let mut response = match &decision {
        Decision::Admitted { .. } => next.run(request).await,
        Decision::Rejected { kind, message, .. } => {
            debug!(
                client = %client,
                kind = %kind,
                path = %request.uri().path(),
                "Request rejected"
            );
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "message": message })),
            )
                .into_response()
        }
    };

    apply_headers(response.headers_mut(), decision.headers());
    response
}

/// Work out who is calling: the first `X-Forwarded-For` hop when trusted and
/// present, otherwise the peer IP.
fn resolve_client_key(
    trust_forwarded_for: bool,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> Result<ClientKey> {
    if trust_forwarded_for {
        if let Some(value) = headers.get(FORWARDED_FOR) {
            let value = value.to_str().map_err(|_| {
                WindowgateError::InvalidClientKey("X-Forwarded-For is not visible ASCII".to_string())
            })?;
            let first_hop = value.split(',').next().unwrap_or_default();
            return ClientKey::parse(first_hop);
        }
    }

    peer.map(|addr| ClientKey::from(addr.ip())).ok_or_else(|| {
        WindowgateError::InvalidClientKey("peer address is unavailable".to_string())
    })
}

fn apply_headers(headers: &mut HeaderMap, values: &RateLimitHeaders) {
    for (name, value) in values.pairs() {
        headers.insert(name, HeaderValue::from(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> Option<SocketAddr> {
        Some(SocketAddr::from(([192, 168, 1, 7], 51000)))
    }

    #[test]
    fn test_key_from_peer() {
        let key = resolve_client_key(false, &HeaderMap::new(), peer()).unwrap();
        assert_eq!(key.as_str(), "192.168.1.7");
    }

    #[test]
    fn test_missing_peer_is_invalid() {
        let err = resolve_client_key(false, &HeaderMap::new(), None).unwrap_err();
        assert!(matches!(err, WindowgateError::InvalidClientKey(_)));
    }

    #[test]
    fn test_forwarded_for_ignored_unless_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("1.2.3.4"));

        let key = resolve_client_key(false, &headers, peer()).unwrap();
        assert_eq!(key.as_str(), "192.168.1.7");
    }

    #[test]
    fn test_forwarded_for_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("1.2.3.4, 10.0.0.1"));

        let key = resolve_client_key(true, &headers, peer()).unwrap();
        assert_eq!(key.as_str(), "1.2.3.4");
    }

    #[test]
    fn test_empty_forwarded_for_is_invalid() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static(" , 10.0.0.1"));

        assert!(resolve_client_key(true, &headers, peer()).is_err());
    }

    #[test]
    fn test_apply_headers() {
        let mut headers = HeaderMap::new();
        apply_headers(
            &mut headers,
            &RateLimitHeaders {
                limit: 60,
                remaining: 12,
                reset: 1_700_000_060,
            },
        );
        assert_eq!(headers["x-ratelimit-limit"], "60");
        assert_eq!(headers["x-ratelimit-remaining"], "12");
        assert_eq!(headers["x-ratelimit-reset"], "1700000060");
    }
}
