//! HTTP server wiring: router, middleware stack, and startup.

use crate::{otp::OtpService, token::TokenSigner};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, patch, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

pub mod handlers;
mod openapi;
pub mod session;

pub use openapi::openapi;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

/// Build the application router. Extensions (pool, OTP service, token
/// signer) are layered on in [`new`]; tests attach their own.
///
/// Registry routes sit behind the session guard; society registration is
/// the exception, authorized by its registration assertion instead.
#[must_use]
pub fn router() -> Router {
    let registry = Router::new()
        .route(
            "/v1/societies",
            get(handlers::societies::list).post(handlers::societies::create),
        )
        .route("/v1/societies/:id", get(handlers::societies::get_one))
        .route(
            "/v1/societies/:id/approve",
            post(handlers::societies::approve),
        )
        .route(
            "/v1/societies/:id/status",
            patch(handlers::societies::update_status),
        )
        .route("/v1/users", post(handlers::users::create))
        .route("/v1/users/:id", get(handlers::users::get_one))
        .route("/v1/users/:id/phone", put(handlers::users::change_phone))
        .route(
            "/v1/memberships",
            get(handlers::memberships::list).post(handlers::memberships::create),
        )
        .route(
            "/v1/memberships/:id",
            get(handlers::memberships::get_one).delete(handlers::memberships::remove),
        )
        .route_layer(axum::middleware::from_fn(session::require_session));

    Router::new()
        .route("/", get(handlers::root::root))
        .route(
            "/health",
            get(handlers::health::health).options(handlers::health::health),
        )
        .route("/v1/openapi.json", get(openapi::openapi_json))
        .route("/v1/auth/request-otp", post(handlers::auth::request_otp))
        .route("/v1/auth/verify-otp", post(handlers::auth::verify_otp))
        .route("/v1/societies/register", post(handlers::societies::register))
        .merge(registry)
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    otp: Arc<OtpService>,
    signer: Arc<TokenSigner>,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_origin(Any);

    let app = router().layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors)
            .layer(Extension(otp))
            .layer(Extension(signer))
            .layer(Extension(pool)),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {err}");
        return;
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_commit_hash_is_never_empty() {
        assert!(!GIT_COMMIT_HASH.is_empty());
    }

    #[test]
    fn router_builds() {
        let _ = router();
    }
}
