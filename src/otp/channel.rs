//! Delivery side of the OTP flow.
//!
//! The service decides whether a code may be sent; channels decide how it
//! reaches the destination and how a submitted code is checked.

use super::OtpError;
use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait OtpChannel: Send + Sync {
    /// Short provider name, surfaced in responses and logs.
    fn name(&self) -> &'static str;

    /// Deliver a verification code to `destination`.
    async fn send_code(&self, destination: &str) -> Result<(), OtpError>;

    /// Check a submitted code for `destination`.
    async fn check_code(&self, destination: &str, code: &str) -> Result<bool, OtpError>;
}

/// Fixed-code channel for development and automated tests.
///
/// Nothing is delivered; every destination shares one well-known code.
#[derive(Clone, Debug)]
pub struct MockChannel {
    code: String,
}

impl MockChannel {
    pub const DEFAULT_CODE: &'static str = "123456";

    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CODE)
    }
}

#[async_trait]
impl OtpChannel for MockChannel {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn send_code(&self, destination: &str) -> Result<(), OtpError> {
        info!(destination, "Mock OTP channel, no code delivered");

        Ok(())
    }

    async fn check_code(&self, _destination: &str, code: &str) -> Result<bool, OtpError> {
        Ok(code == self.code)
    }
}
