//! `OpenAPI` document, generated from the handler annotations and served at
//! `/v1/openapi.json`.

use super::handlers::{auth, health, memberships, root, societies, users};
use crate::registry::{
    Membership, MembershipStatus, NewSociety, NewUser, Society, SocietyStatus, User,
};
use axum::response::{IntoResponse, Json};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        root::root,
        health::health,
        auth::request_otp,
        auth::verify_otp,
        societies::list,
        societies::get_one,
        societies::create,
        societies::register,
        societies::approve,
        societies::update_status,
        users::create,
        users::get_one,
        users::change_phone,
        memberships::list,
        memberships::get_one,
        memberships::create,
        memberships::remove,
    ),
    components(schemas(
        health::Health,
        auth::RequestOtpRequest,
        auth::RequestOtpResponse,
        auth::VerifyOtpRequest,
        auth::VerifyPurpose,
        auth::LoginResponse,
        auth::RegistrationTokenResponse,
        societies::StatusRequest,
        societies::AdminRequest,
        societies::RegisterRequest,
        societies::RegisterResponse,
        users::ChangePhoneRequest,
        memberships::CreateRequest,
        Society,
        SocietyStatus,
        NewSociety,
        User,
        NewUser,
        Membership,
        MembershipStatus,
    )),
    tags(
        (name = "health", description = "Liveness and build information"),
        (name = "auth", description = "OTP issuance, verification, and login"),
        (name = "societies", description = "Society submission and review"),
        (name = "users", description = "User records"),
        (name = "memberships", description = "Society memberships")
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

pub async fn openapi_json() -> impl IntoResponse {
    Json(openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = openapi();
        let paths = &doc.paths.paths;

        for path in [
            "/",
            "/health",
            "/v1/auth/request-otp",
            "/v1/auth/verify-otp",
            "/v1/societies",
            "/v1/societies/register",
            "/v1/societies/{id}",
            "/v1/societies/{id}/approve",
            "/v1/societies/{id}/status",
            "/v1/users",
            "/v1/users/{id}",
            "/v1/users/{id}/phone",
            "/v1/memberships",
            "/v1/memberships/{id}",
        ] {
            assert!(paths.contains_key(path), "missing path: {path}");
        }
    }
}
