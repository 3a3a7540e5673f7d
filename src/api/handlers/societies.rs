//! Society submission, review, and combined registration endpoints.

use super::{registry_error_response, token_error_response, valid_mobile};
use crate::{
    registry::{
        service::{self, Registration},
        NewSociety, NewUser, RecordKey, Society, SocietyStatus, User,
    },
    token::TokenSigner,
};
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusRequest {
    pub status: SocietyStatus,
}

/// Admin contact fields for the combined registration flow. The admin's
/// phone comes from the registration assertion, never from the payload.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AdminRequest {
    pub full_name: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub society: NewSociety,
    pub admin: AdminRequest,
    pub mobile: String,
    pub otp_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub message: String,
    pub society: Society,
    pub admin: User,
}

/// List societies, optionally filtered by status.
#[utoipa::path(
    get,
    path = "/v1/societies",
    params(
        ("status" = Option<String>, Query, description = "pending, approved, rejected or suspended")
    ),
    responses(
        (status = 200, description = "Societies", body = [Society]),
        (status = 400, description = "Unknown status filter", body = String),
        (status = 401, description = "Missing or invalid session token", body = String)
    ),
    tag = "societies"
)]
pub async fn list(pool: Extension<PgPool>, query: Query<ListQuery>) -> impl IntoResponse {
    let status = match &query.status {
        Some(raw) => match SocietyStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    format!("Unknown society status: {raw}"),
                )
                    .into_response()
            }
        },
        None => None,
    };

    match service::list_societies(&pool, status).await {
        Ok(societies) => Json(societies).into_response(),
        Err(err) => registry_error_response(err),
    }
}

/// Fetch one society by durable id, registration id, or row UUID.
#[utoipa::path(
    get,
    path = "/v1/societies/{id}",
    params(("id" = String, Path, description = "Numeric id or UUID")),
    responses(
        (status = 200, description = "Society", body = Society),
        (status = 400, description = "Malformed id", body = String),
        (status = 401, description = "Missing or invalid session token", body = String),
        (status = 404, description = "Not found", body = String)
    ),
    tag = "societies"
)]
pub async fn get_one(pool: Extension<PgPool>, id: Path<String>) -> impl IntoResponse {
    let Some(key) = RecordKey::parse(&id) else {
        return (StatusCode::BAD_REQUEST, "Invalid society id".to_string()).into_response();
    };

    match service::get_society(&pool, &key).await {
        Ok(society) => Json(society).into_response(),
        Err(err) => registry_error_response(err),
    }
}

/// Submit a society for review.
#[utoipa::path(
    post,
    path = "/v1/societies",
    request_body = NewSociety,
    responses(
        (status = 201, description = "Society submitted", body = Society),
        (status = 400, description = "Invalid payload", body = String),
        (status = 401, description = "Missing or invalid session token", body = String)
    ),
    tag = "societies"
)]
pub async fn create(
    pool: Extension<PgPool>,
    payload: Option<Json<NewSociety>>,
) -> impl IntoResponse {
    let society = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if society.name.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Society name is required".to_string()).into_response();
    }

    match service::submit_society(&pool, &society).await {
        Ok(society) => (StatusCode::CREATED, Json(society)).into_response(),
        Err(err) => registry_error_response(err),
    }
}

/// Register a society together with its admin user, authorized by a
/// registration assertion from the OTP flow.
#[utoipa::path(
    post,
    path = "/v1/societies/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Society and admin created", body = RegisterResponse),
        (status = 400, description = "Invalid payload or mobile mismatch", body = String),
        (status = 401, description = "Invalid or expired assertion", body = String),
        (status = 409, description = "Phone or email already registered", body = String)
    ),
    tag = "societies"
)]
pub async fn register(
    pool: Extension<PgPool>,
    signer: Extension<Arc<TokenSigner>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let mobile = request.mobile.trim();
    if !valid_mobile(mobile) {
        return (
            StatusCode::BAD_REQUEST,
            "Valid 10-digit mobile number is required".to_string(),
        )
            .into_response();
    }

    if request.society.name.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Society name is required".to_string()).into_response();
    }

    if request.admin.full_name.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Admin name is required".to_string()).into_response();
    }

    if let Err(err) = signer.redeem_registration(&request.otp_token, mobile) {
        return token_error_response(&err);
    }

    let admin = NewUser {
        full_name: request.admin.full_name.clone(),
        phone: mobile.to_string(),
        email: request.admin.email.clone(),
        role: Some("admin".to_string()),
    };

    match service::register_society(&pool, &request.society, &admin).await {
        Ok(Registration { society, admin }) => (
            StatusCode::CREATED,
            Json(RegisterResponse {
                message: "Society registered".to_string(),
                society,
                admin,
            }),
        )
            .into_response(),
        Err(err) => registry_error_response(err),
    }
}

/// Approve a society, assigning its durable id on first approval.
#[utoipa::path(
    post,
    path = "/v1/societies/{id}/approve",
    params(("id" = String, Path, description = "Numeric id or UUID")),
    responses(
        (status = 200, description = "Approved society", body = Society),
        (status = 401, description = "Missing or invalid session token", body = String),
        (status = 404, description = "Not found", body = String)
    ),
    tag = "societies"
)]
pub async fn approve(pool: Extension<PgPool>, id: Path<String>) -> impl IntoResponse {
    let Some(key) = RecordKey::parse(&id) else {
        return (StatusCode::BAD_REQUEST, "Invalid society id".to_string()).into_response();
    };

    match service::approve_society(&pool, &key).await {
        Ok(society) => Json(society).into_response(),
        Err(err) => registry_error_response(err),
    }
}

/// Move a society to a new status. Approval routes through the same id
/// assignment as the approve endpoint.
#[utoipa::path(
    patch,
    path = "/v1/societies/{id}/status",
    params(("id" = String, Path, description = "Numeric id or UUID")),
    request_body = StatusRequest,
    responses(
        (status = 200, description = "Updated society", body = Society),
        (status = 400, description = "Invalid payload", body = String),
        (status = 401, description = "Missing or invalid session token", body = String),
        (status = 404, description = "Not found", body = String)
    ),
    tag = "societies"
)]
pub async fn update_status(
    pool: Extension<PgPool>,
    id: Path<String>,
    payload: Option<Json<StatusRequest>>,
) -> impl IntoResponse {
    let Some(key) = RecordKey::parse(&id) else {
        return (StatusCode::BAD_REQUEST, "Invalid society id".to_string()).into_response();
    };

    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match service::update_society_status(&pool, &key, request.status).await {
        Ok(society) => Json(society).into_response(),
        Err(err) => registry_error_response(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn lazy_pool() -> Extension<PgPool> {
        Extension(
            sqlx::postgres::PgPoolOptions::new()
                .connect_lazy("postgres://localhost:1/unreachable")
                .expect("lazy pool"),
        )
    }

    fn signer_extension() -> Extension<Arc<TokenSigner>> {
        Extension(Arc::new(TokenSigner::new(&SecretString::from(
            "test-secret".to_string(),
        ))))
    }

    fn register_request(mobile: &str, otp_token: &str) -> RegisterRequest {
        RegisterRequest {
            society: NewSociety {
                name: "Green Acres".to_string(),
                phone: None,
                email: None,
                address: None,
                city: None,
                district: None,
                state: None,
                country: None,
                pincode: None,
            },
            admin: AdminRequest {
                full_name: "Asha Rao".to_string(),
                email: None,
            },
            mobile: mobile.to_string(),
            otp_token: otp_token.to_string(),
        }
    }

    #[tokio::test]
    async fn list_rejects_unknown_status_filter() {
        let response = list(
            lazy_pool(),
            Query(ListQuery {
                status: Some("deleted".to_string()),
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_one_rejects_malformed_id() {
        let response = get_one(lazy_pool(), Path("not-a-key".to_string()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_requires_a_name() {
        let response = create(
            lazy_pool(),
            Some(Json(NewSociety {
                name: "  ".to_string(),
                phone: None,
                email: None,
                address: None,
                city: None,
                district: None,
                state: None,
                country: None,
                pincode: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn register_rejects_garbage_assertions() {
        let response = register(
            lazy_pool(),
            signer_extension(),
            Some(Json(register_request("9876543210", "garbage"))),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_rejects_assertion_for_another_mobile() {
        let signer = signer_extension();
        let token = signer.issue_registration("9123456780").unwrap();

        let response = register(
            lazy_pool(),
            signer,
            Some(Json(register_request("9876543210", &token))),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_status_requires_payload() {
        let response = update_status(lazy_pool(), Path("1000".to_string()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
