//! Signed bearer tokens: registration assertions and login sessions.
//!
//! A registration assertion proves "this mobile number was verified by OTP
//! recently" without any server-side state; the society registration flow
//! redeems it instead of re-running verification. Session tokens carry the
//! logged-in user's identity for subsequent requests. Both are HS256 JWTs
//! signed with the service secret.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// `type` claim value of a registration assertion.
pub const REGISTRATION_TOKEN_TYPE: &str = "otp_registration";

const DEFAULT_REGISTRATION_TTL_SECONDS: i64 = 30 * 60;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    /// Malformed, tampered, expired, or wrong-type token. Collapsed into one
    /// variant so callers cannot leak which check failed.
    #[error("Invalid or expired token")]
    TokenInvalid,

    /// The token is genuine but was issued for a different mobile number.
    #[error("OTP token does not match the provided mobile number")]
    MobileMismatch,

    #[error("Failed to sign token")]
    Signing,
}

/// Claims of a registration assertion token.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RegistrationClaims {
    #[serde(rename = "type")]
    pub token_type: String,
    pub mobile: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of a login session token. `sub` is the durable user id.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    pub sub: String,
    pub phone: String,
    pub role: String,
    pub society_ids: Vec<i64>,
    pub iat: i64,
    pub exp: i64,
}

pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    registration_ttl_seconds: i64,
    session_ttl_seconds: i64,
}

impl TokenSigner {
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let secret = secret.expose_secret().as_bytes();

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            registration_ttl_seconds: DEFAULT_REGISTRATION_TTL_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_registration_ttl_seconds(mut self, seconds: i64) -> Self {
        self.registration_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    /// Lifetime handed to new registration assertions, for client display.
    #[must_use]
    pub fn registration_ttl_seconds(&self) -> i64 {
        self.registration_ttl_seconds
    }

    /// Issue a registration assertion for a mobile number that just passed
    /// OTP verification.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Signing` if encoding fails.
    pub fn issue_registration(&self, mobile: &str) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = RegistrationClaims {
            token_type: REGISTRATION_TOKEN_TYPE.to_string(),
            mobile: mobile.to_string(),
            iat: now,
            exp: now + self.registration_ttl_seconds,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|_| TokenError::Signing)
    }

    /// Validate a registration assertion against the mobile number a caller
    /// claims to own.
    ///
    /// Assertions are not consumed: the same token redeems any number of
    /// times until it expires. Validity lives entirely in the signed claims.
    ///
    /// # Errors
    ///
    /// Returns `TokenInvalid` for anything wrong with the token itself and
    /// `MobileMismatch` when a genuine token carries a different number.
    pub fn redeem_registration(
        &self,
        token: &str,
        mobile: &str,
    ) -> Result<RegistrationClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let claims = decode::<RegistrationClaims>(token, &self.decoding, &validation)
            .map_err(|_| TokenError::TokenInvalid)?
            .claims;

        if claims.token_type != REGISTRATION_TOKEN_TYPE {
            return Err(TokenError::TokenInvalid);
        }

        if claims.mobile != mobile.trim() {
            return Err(TokenError::MobileMismatch);
        }

        Ok(claims)
    }

    /// Mint a session token for a user who just completed a login.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Signing` if encoding fails.
    pub fn mint_session(
        &self,
        user_id: i64,
        phone: &str,
        role: &str,
        society_ids: &[i64],
    ) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            phone: phone.to_string(),
            role: role.to_string(),
            society_ids: society_ids.to_vec(),
            iat: now,
            exp: now + self.session_ttl_seconds,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|_| TokenError::Signing)
    }

    /// Validate a session token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::TokenInvalid` for malformed, tampered, or
    /// expired tokens.
    pub fn verify_session(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::TokenInvalid)
    }
}
