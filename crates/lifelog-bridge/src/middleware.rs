//! API key authentication.
//!
//! When `security.api_key_enabled` is set, every request except
//! `/api/health` must carry the key in the `X-API-Key` header. The device
//! link may pass it as a `token` query parameter instead, since WebSocket
//! clients cannot always set headers on the upgrade request.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::SecurityConfig;

/// API key authentication middleware.
///
/// Returns 401 Unauthorized if the key is missing or invalid.
pub async fn api_key_auth(
    headers: HeaderMap,
    State(config): State<Arc<SecurityConfig>>,
    request: Request,
    next: Next,
) -> Response {
    if !config.api_key_enabled || request.uri().path() == "/api/health" {
        return next.run(request).await;
    }

    let provided_key = headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().query().and_then(token_from_query));

    let valid = match (&config.api_key, provided_key) {
        (Some(expected), Some(provided)) => keys_match(expected, provided),
        _ => false,
    };

    if valid {
        next.run(request).await
    } else {
        warn!("API key authentication failed for {}", request.uri().path());
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "Invalid or missing API key",
                "hint": "Provide a valid API key in the X-API-Key header or as a 'token' query parameter"
            })),
        )
            .into_response()
    }
}

fn token_from_query(query: &str) -> Option<&str> {
    query.split('&').find_map(|param| match param.split_once('=') {
        Some(("token", value)) => Some(value),
        _ => None,
    })
}

fn keys_match(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, middleware, routing::get};
    use tower::ServiceExt;

    fn app(config: SecurityConfig) -> Router {
        let config = Arc::new(config);
        Router::new()
            .route("/api/health", get(|| async { "ok" }))
            .route("/api/status", get(|| async { "status" }))
            .layer(middleware::from_fn_with_state(config, api_key_auth))
    }

    fn enabled() -> SecurityConfig {
        SecurityConfig {
            api_key_enabled: true,
            api_key: Some("0123456789abcdef".to_string()),
        }
    }

    async fn status_of(app: Router, request: Request<Body>) -> StatusCode {
        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_disabled_allows_everything() {
        let request = Request::builder().uri("/api/status").body(Body::empty()).unwrap();
        assert_eq!(
            status_of(app(SecurityConfig::default()), request).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_rejected() {
        let request = Request::builder().uri("/api/status").body(Body::empty()).unwrap();
        assert_eq!(status_of(app(enabled()), request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_health_needs_no_key() {
        let request = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
        assert_eq!(status_of(app(enabled()), request).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_header_key() {
        let request = Request::builder()
            .uri("/api/status")
            .header("X-API-Key", "0123456789abcdef")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(app(enabled()), request).await, StatusCode::OK);

        let request = Request::builder()
            .uri("/api/status")
            .header("X-API-Key", "wrong-key-wrong-key")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(app(enabled()), request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_query_token() {
        let request = Request::builder()
            .uri("/api/status?token=0123456789abcdef")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(app(enabled()), request).await, StatusCode::OK);
    }

    #[test]
    fn test_token_from_query() {
        assert_eq!(token_from_query("token=abc123"), Some("abc123"));
        assert_eq!(token_from_query("foo=bar&token=abc123"), Some("abc123"));
        assert_eq!(token_from_query("foo=bar"), None);
        assert_eq!(token_from_query(""), None);
        assert_eq!(token_from_query("tokenx=abc123"), None);
    }

    #[test]
    fn test_keys_match() {
        assert!(keys_match("hello", "hello"));
        assert!(!keys_match("hello", "world"));
        assert!(!keys_match("short", "longer"));
    }
}
