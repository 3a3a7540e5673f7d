//! API handlers and shared utilities.
//!
//! Handlers validate input, call into the domain services, and translate
//! domain errors into HTTP responses. Internal failures are logged and
//! collapsed into a generic message so storage details never leak.

pub mod auth;
pub mod health;
pub mod memberships;
pub mod root;
pub mod societies;
pub mod users;

use crate::{otp::OtpError, registry::RegistryError, token::TokenError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

/// Mobile sanity check shared with the OTP service, so the two surfaces
/// accept the same numbers.
pub use crate::otp::valid_mobile;

pub(crate) fn registry_error_response(err: RegistryError) -> Response {
    let status = match &err {
        RegistryError::SocietyNotFound
        | RegistryError::UserNotFound
        | RegistryError::MembershipNotFound => StatusCode::NOT_FOUND,
        RegistryError::SocietyNotApproved => StatusCode::FORBIDDEN,
        RegistryError::DuplicateMembership
        | RegistryError::DuplicateMemberNumber
        | RegistryError::DuplicatePhone
        | RegistryError::DuplicateEmail => StatusCode::CONFLICT,
        RegistryError::Sequence(_) | RegistryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Registry failure: {err}");
        return (status, "Internal error".to_string()).into_response();
    }

    (status, err.to_string()).into_response()
}

pub(crate) fn otp_error_response(err: OtpError) -> Response {
    match err {
        OtpError::InvalidDestination | OtpError::InvalidDevice | OtpError::CodeRequired => {
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        OtpError::Cooldown { .. } | OtpError::AttemptsExhausted { .. } => {
            (StatusCode::TOO_MANY_REQUESTS, err.to_string()).into_response()
        }
        OtpError::CodeMismatch => (StatusCode::UNAUTHORIZED, err.to_string()).into_response(),
        OtpError::ChannelUnavailable | OtpError::DeliveryFailed(_) => {
            error!("OTP channel failure: {err}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "OTP delivery unavailable".to_string(),
            )
                .into_response()
        }
    }
}

pub(crate) fn token_error_response(err: &TokenError) -> Response {
    match err {
        TokenError::TokenInvalid => (StatusCode::UNAUTHORIZED, err.to_string()).into_response(),
        TokenError::MobileMismatch => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
        TokenError::Signing => {
            error!("Token signing failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
            )
                .into_response()
        }
    }
}
