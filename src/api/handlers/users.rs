//! User creation, lookup, and verified phone changes.

use super::{registry_error_response, token_error_response, valid_mobile};
use crate::{
    registry::{service, NewUser, RecordKey, User},
    token::TokenSigner,
};
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePhoneRequest {
    pub phone: String,
    /// Registration assertion proving the caller controls the new number.
    pub otp_token: String,
}

/// Create a user with a freshly allocated durable id.
#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = NewUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid payload", body = String),
        (status = 401, description = "Missing or invalid session token", body = String),
        (status = 409, description = "Phone or email already registered", body = String)
    ),
    tag = "users"
)]
pub async fn create(pool: Extension<PgPool>, payload: Option<Json<NewUser>>) -> impl IntoResponse {
    let user = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if user.full_name.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Full name is required".to_string()).into_response();
    }

    if !valid_mobile(user.phone.trim()) {
        return (
            StatusCode::BAD_REQUEST,
            "Valid 10-digit mobile number is required".to_string(),
        )
            .into_response();
    }

    match service::create_user(&pool, &user).await {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(err) => registry_error_response(err),
    }
}

/// Fetch one user by durable id or row UUID.
#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "Numeric id or UUID")),
    responses(
        (status = 200, description = "User", body = User),
        (status = 400, description = "Malformed id", body = String),
        (status = 401, description = "Missing or invalid session token", body = String),
        (status = 404, description = "Not found", body = String)
    ),
    tag = "users"
)]
pub async fn get_one(pool: Extension<PgPool>, id: Path<String>) -> impl IntoResponse {
    let Some(key) = RecordKey::parse(&id) else {
        return (StatusCode::BAD_REQUEST, "Invalid user id".to_string()).into_response();
    };

    match service::get_user(&pool, &key).await {
        Ok(user) => Json(user).into_response(),
        Err(err) => registry_error_response(err),
    }
}

/// Change a user's phone number. The new number must carry a registration
/// assertion minted after OTP verification of that same number.
#[utoipa::path(
    put,
    path = "/v1/users/{id}/phone",
    params(("id" = String, Path, description = "Numeric id or UUID")),
    request_body = ChangePhoneRequest,
    responses(
        (status = 200, description = "Updated user", body = User),
        (status = 400, description = "Invalid payload or mobile mismatch", body = String),
        (status = 401, description = "Missing session or invalid assertion", body = String),
        (status = 404, description = "Not found", body = String),
        (status = 409, description = "Phone already registered", body = String)
    ),
    tag = "users"
)]
pub async fn change_phone(
    pool: Extension<PgPool>,
    signer: Extension<Arc<TokenSigner>>,
    id: Path<String>,
    payload: Option<Json<ChangePhoneRequest>>,
) -> impl IntoResponse {
    let Some(key) = RecordKey::parse(&id) else {
        return (StatusCode::BAD_REQUEST, "Invalid user id".to_string()).into_response();
    };

    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let phone = request.phone.trim();
    if !valid_mobile(phone) {
        return (
            StatusCode::BAD_REQUEST,
            "Valid 10-digit mobile number is required".to_string(),
        )
            .into_response();
    }

    if let Err(err) = signer.redeem_registration(&request.otp_token, phone) {
        return token_error_response(&err);
    }

    match service::change_user_phone(&pool, &key, phone).await {
        Ok(user) => Json(user).into_response(),
        Err(err) => registry_error_response(err),
    }
}
