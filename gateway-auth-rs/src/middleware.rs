// gateway-auth-rs/src/middleware.rs

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

use crate::{AuthError, AuthenticatedCaller, JwtVerifier};

const PUBLIC_PATHS: &[&str] = &["/", "/health"];

fn extract_bearer(header: Option<&HeaderValue>) -> Result<&str, AuthError> {
    let value = header
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(AuthError::InvalidScheme),
    }
}

/// Rejects requests without a valid bearer token with `401`.
///
/// Preflight requests and the public paths pass through untouched.
/// Install with `axum::middleware::from_fn_with_state(verifier, require_bearer)`.
pub async fn require_bearer(State(verifier): State<Arc<JwtVerifier>>, mut req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS || PUBLIC_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    let claims = match extract_bearer(req.headers().get(AUTHORIZATION)).and_then(|token| verifier.verify(token)) {
        Ok(claims) => claims,
        Err(err) => {
            debug!(path = %req.uri().path(), error = %err, "Rejected unauthenticated request");
            return err.into_response();
        }
    };

    req.extensions_mut().insert(AuthenticatedCaller { subject: claims.sub });
    next.run(req).await
}

/// Permissive CORS: any origin, GET/POST/OPTIONS, Authorization and Content-Type headers
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, axum::http::header::CONTENT_TYPE])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{issue_token, ErrorResponse};
    use axum::{body::Body, http::Request as HttpRequest, http::StatusCode, middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";

    async fn whoami(Extension(caller): Extension<AuthenticatedCaller>) -> String {
        caller.subject.unwrap_or_default()
    }

    fn app() -> Router {
        let verifier = Arc::new(JwtVerifier::new(SECRET).unwrap());
        Router::new()
            .route("/", get(|| async { "root" }))
            .route("/health", get(|| async { "ok" }))
            .route("/private", get(whoami))
            .layer(middleware::from_fn_with_state(verifier, require_bearer))
            .layer(cors_layer())
    }

    async fn body_string(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn missing_token_is_401_with_json_body() {
        let resp = app()
            .oneshot(HttpRequest::builder().uri("/private").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: ErrorResponse = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(body.code, 401);
        assert_eq!(body.error, "Missing authentication token");
    }

    #[tokio::test]
    async fn valid_token_reaches_handler_with_caller() {
        let token = issue_token(SECRET, "guest-app", None).unwrap();
        let resp = app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/private")
                    .header(AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "guest-app");
    }

    #[tokio::test]
    async fn bad_scheme_and_bad_signature_are_401() {
        let foreign = issue_token("other-secret", "x", None).unwrap();
        for header in ["Basic abc".to_string(), format!("Bearer {}", foreign), "Bearer ".to_string()] {
            let resp = app()
                .oneshot(
                    HttpRequest::builder()
                        .uri("/private")
                        .header(AUTHORIZATION, header)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn public_paths_skip_auth() {
        for path in ["/", "/health"] {
            let resp = app()
                .oneshot(HttpRequest::builder().uri(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn preflight_is_answered_without_auth() {
        let resp = app()
            .oneshot(
                HttpRequest::builder()
                    .method(Method::OPTIONS)
                    .uri("/private")
                    .header("origin", "http://guest.example")
                    .header("access-control-request-method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }
}
