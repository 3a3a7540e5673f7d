//! OTP request and verification endpoints.

use super::{otp_error_response, registry_error_response, token_error_response};
use crate::{
    otp::OtpService,
    registry::{service, User},
    token::TokenSigner,
};
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RequestOtpRequest {
    pub mobile: String,
    pub device_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestOtpResponse {
    pub message: String,
    pub provider: String,
    pub attempts_used: u32,
    pub attempts_remaining: u32,
    pub cooldown_seconds: u64,
    pub reset_in_seconds: u64,
}

/// What a successful verification is used for.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VerifyPurpose {
    #[default]
    Login,
    Registration,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyOtpRequest {
    pub mobile: String,
    pub code: String,
    #[serde(default)]
    pub purpose: VerifyPurpose,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegistrationTokenResponse {
    pub message: String,
    pub otp_token: String,
    pub expires_in_seconds: i64,
}

/// Issue a one-time code, rate limited per device and mobile.
#[utoipa::path(
    post,
    path = "/v1/auth/request-otp",
    request_body = RequestOtpRequest,
    responses(
        (status = 200, description = "Code issued", body = RequestOtpResponse),
        (status = 400, description = "Invalid mobile or device id", body = String),
        (status = 429, description = "Cooldown or attempt limit hit", body = String),
        (status = 503, description = "No delivery channel available", body = String)
    ),
    tag = "auth"
)]
pub async fn request_otp(
    otp: Extension<Arc<OtpService>>,
    payload: Option<Json<RequestOtpRequest>>,
) -> impl IntoResponse {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match otp.request_code(&request.mobile, &request.device_id).await {
        Ok(receipt) => Json(RequestOtpResponse {
            message: "OTP sent".to_string(),
            provider: receipt.provider.to_string(),
            attempts_used: receipt.attempts_used,
            attempts_remaining: receipt.attempts_remaining,
            cooldown_seconds: receipt.cooldown_seconds,
            reset_in_seconds: receipt.reset_in_seconds,
        })
        .into_response(),
        Err(err) => otp_error_response(err),
    }
}

/// Verify a code and either log the user in or hand out a registration
/// assertion, depending on `purpose`.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Session or registration token", body = LoginResponse),
        (status = 400, description = "Invalid input", body = String),
        (status = 401, description = "Wrong code", body = String),
        (status = 403, description = "A linked society is not approved", body = String),
        (status = 404, description = "No user for this mobile", body = String)
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    pool: Extension<PgPool>,
    otp: Extension<Arc<OtpService>>,
    signer: Extension<Arc<TokenSigner>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> impl IntoResponse {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if let Err(err) = otp.verify_code(&request.mobile, &request.code).await {
        return otp_error_response(err);
    }

    let mobile = request.mobile.trim();

    match request.purpose {
        VerifyPurpose::Registration => match signer.issue_registration(mobile) {
            Ok(otp_token) => Json(RegistrationTokenResponse {
                message: "OTP verified".to_string(),
                otp_token,
                expires_in_seconds: signer.registration_ttl_seconds(),
            })
            .into_response(),
            Err(err) => token_error_response(&err),
        },
        VerifyPurpose::Login => {
            let user = match service::admit_user(&pool, mobile).await {
                Ok(user) => user,
                Err(err) => return registry_error_response(err),
            };

            match signer.mint_session(user.user_id, &user.phone, &user.role, &user.society_ids) {
                Ok(token) => Json(LoginResponse {
                    message: "Login successful".to_string(),
                    token,
                    user,
                })
                .into_response(),
                Err(err) => token_error_response(&err),
            }
        }
    }
}
