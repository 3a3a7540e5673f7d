//! Membership endpoints.

use super::registry_error_response;
use crate::registry::{
    service::{self, MembershipRequest},
    Membership, MembershipStatus, RecordKey,
};
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use sqlx::PgPool;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub user_id: Option<i64>,
    pub society_id: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRequest {
    /// User durable id or row UUID.
    pub user: String,
    /// Society durable id, registration id, or row UUID.
    pub society: String,
    pub role: Option<String>,
    pub society_role: Option<String>,
    pub status: Option<MembershipStatus>,
    /// Explicit member number; allocated when absent.
    pub society_user_id: Option<i64>,
}

/// List memberships, optionally filtered by user and society.
#[utoipa::path(
    get,
    path = "/v1/memberships",
    params(
        ("user_id" = Option<i64>, Query, description = "Filter by durable user id"),
        ("society_id" = Option<i64>, Query, description = "Filter by durable society id")
    ),
    responses(
        (status = 200, description = "Memberships", body = [Membership]),
        (status = 401, description = "Missing or invalid session token", body = String)
    ),
    tag = "memberships"
)]
pub async fn list(pool: Extension<PgPool>, query: Query<ListQuery>) -> impl IntoResponse {
    match service::list_memberships(&pool, query.user_id, query.society_id).await {
        Ok(memberships) => Json(memberships).into_response(),
        Err(err) => registry_error_response(err),
    }
}

/// Fetch one membership.
#[utoipa::path(
    get,
    path = "/v1/memberships/{id}",
    params(("id" = Uuid, Path, description = "Membership UUID")),
    responses(
        (status = 200, description = "Membership", body = Membership),
        (status = 401, description = "Missing or invalid session token", body = String),
        (status = 404, description = "Not found", body = String)
    ),
    tag = "memberships"
)]
pub async fn get_one(pool: Extension<PgPool>, id: Path<Uuid>) -> impl IntoResponse {
    match service::get_membership(&pool, *id).await {
        Ok(membership) => Json(membership).into_response(),
        Err(err) => registry_error_response(err),
    }
}

/// Create a membership in an approved society, allocating the member number
/// and maintaining the user's `society_ids` projection.
#[utoipa::path(
    post,
    path = "/v1/memberships",
    request_body = CreateRequest,
    responses(
        (status = 201, description = "Membership created", body = Membership),
        (status = 400, description = "Invalid payload", body = String),
        (status = 401, description = "Missing or invalid session token", body = String),
        (status = 403, description = "Society not approved", body = String),
        (status = 404, description = "User or society not found", body = String),
        (status = 409, description = "Duplicate membership or member number", body = String)
    ),
    tag = "memberships"
)]
pub async fn create(
    pool: Extension<PgPool>,
    payload: Option<Json<CreateRequest>>,
) -> impl IntoResponse {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let Some(user) = RecordKey::parse(&request.user) else {
        return (StatusCode::BAD_REQUEST, "Invalid user id".to_string()).into_response();
    };

    let Some(society) = RecordKey::parse(&request.society) else {
        return (StatusCode::BAD_REQUEST, "Invalid society id".to_string()).into_response();
    };

    let request = MembershipRequest {
        user,
        society,
        role: request.role,
        society_role: request.society_role,
        status: request.status,
        society_user_id: request.society_user_id,
    };

    match service::create_membership(&pool, &request).await {
        Ok(membership) => (StatusCode::CREATED, Json(membership)).into_response(),
        Err(err) => registry_error_response(err),
    }
}

/// Delete a membership, pruning the user's projection entry when it was the
/// last membership for that society.
#[utoipa::path(
    delete,
    path = "/v1/memberships/{id}",
    params(("id" = Uuid, Path, description = "Membership UUID")),
    responses(
        (status = 200, description = "Deleted membership", body = Membership),
        (status = 401, description = "Missing or invalid session token", body = String),
        (status = 404, description = "Not found", body = String)
    ),
    tag = "memberships"
)]
pub async fn remove(pool: Extension<PgPool>, id: Path<Uuid>) -> impl IntoResponse {
    match service::remove_membership(&pool, *id).await {
        Ok(membership) => Json(membership).into_response(),
        Err(err) => registry_error_response(err),
    }
}
