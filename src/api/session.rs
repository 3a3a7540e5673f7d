//! Session guard for the registry routes.
//!
//! Society, user, and membership endpoints require a Bearer session token
//! minted by the login flow. The society registration endpoint is the one
//! registry route left open: its capability is the OTP registration
//! assertion carried in the payload, and a first-time admin has no session
//! yet.

use crate::token::TokenSigner;
use axum::{
    extract::{Extension, Request},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Reject requests without a valid Bearer session token.
pub async fn require_session(
    signer: Extension<Arc<TokenSigner>>,
    request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let Some(token) = token else {
        return (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()).into_response();
    };

    if let Err(err) = signer.verify_session(token) {
        return (StatusCode::UNAUTHORIZED, err.to_string()).into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api, token::TokenSigner};
    use axum::{body::Body, http::Request};
    use secrecy::SecretString;
    use tower::ServiceExt;

    fn app(signer: Arc<TokenSigner>) -> axum::Router {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost:1/unreachable")
            .expect("lazy pool");

        api::router()
            .layer(Extension(signer))
            .layer(Extension(pool))
    }

    fn signer() -> Arc<TokenSigner> {
        Arc::new(TokenSigner::new(&SecretString::from(
            "test-secret".to_string(),
        )))
    }

    #[tokio::test]
    async fn missing_bearer_token_is_unauthorized() {
        let app = app(signer());

        for uri in ["/v1/societies", "/v1/users/1000", "/v1/memberships"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn garbage_token_is_unauthorized() {
        let app = app(signer());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/societies")
                    .header(AUTHORIZATION, "Bearer garbage")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn registration_assertion_cannot_open_a_session() {
        let signer = signer();
        let assertion = signer.issue_registration("9876543210").unwrap();
        let app = app(signer);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/societies")
                    .header(AUTHORIZATION, format!("Bearer {assertion}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_session_reaches_the_handler() {
        let signer = signer();
        let session = signer
            .mint_session(1001, "9876543210", "member", &[1000])
            .unwrap();
        let app = app(signer);

        // A malformed key answers 400 from the handler, past the guard.
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/societies/not-a-key")
                    .header(AUTHORIZATION, format!("Bearer {session}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn society_registration_stays_open() {
        let app = app(signer());

        // No Bearer header: the route is reachable and complains about the
        // payload, not about a session.
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/societies/register")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
