//! One-time-password issuance and verification.
//!
//! Sending is rate limited per `device::mobile` key: a 60 second cooldown
//! between codes and at most three codes per 30 minute window. Verification
//! is a stateless check against the delivery channel and deliberately does
//! not consult the send window, so a failed login attempt never locks the
//! user out of requesting a fresh code.

pub mod channel;
pub mod window;

pub use channel::{MockChannel, OtpChannel};
pub use window::{InMemoryWindowStore, OtpWindowStore, Window};

use regex::Regex;
use std::{
    sync::{Arc, LazyLock},
    time::{Duration, Instant},
};
use tracing::{debug, warn};
use window::{MAX_ATTEMPTS, RESEND_COOLDOWN, WINDOW_TTL};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OtpError {
    #[error("Valid 10-digit mobile number is required")]
    InvalidDestination,

    #[error("Valid device id is required")]
    InvalidDevice,

    #[error("Please wait {retry_after_seconds} seconds before requesting another code")]
    Cooldown { retry_after_seconds: u64 },

    #[error("Maximum OTP requests reached, try again in {retry_after_seconds} seconds")]
    AttemptsExhausted { retry_after_seconds: u64 },

    #[error("Verification code is required")]
    CodeRequired,

    #[error("Invalid verification code")]
    CodeMismatch,

    #[error("No OTP delivery channel is configured")]
    ChannelUnavailable,

    #[error("Code delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Counters returned after a code is issued, for client-side UX.
#[derive(Clone, Copy, Debug)]
pub struct OtpReceipt {
    pub provider: &'static str,
    pub attempts_used: u32,
    pub attempts_remaining: u32,
    pub cooldown_seconds: u64,
    pub reset_in_seconds: u64,
}

pub struct OtpService {
    store: Arc<dyn OtpWindowStore>,
    channel: Option<Arc<dyn OtpChannel>>,
    cooldown: Duration,
    window_ttl: Duration,
    max_attempts: u32,
}

impl OtpService {
    #[must_use]
    pub fn new(store: Arc<dyn OtpWindowStore>, channel: Option<Arc<dyn OtpChannel>>) -> Self {
        Self {
            store,
            channel,
            cooldown: RESEND_COOLDOWN,
            window_ttl: WINDOW_TTL,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn with_window_ttl(mut self, window_ttl: Duration) -> Self {
        self.window_ttl = window_ttl;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Issue a code for `mobile`, charged against the `device_id::mobile`
    /// send window.
    ///
    /// The window is updated before delivery is attempted, so a flaky
    /// channel cannot be used to bypass the cooldown by retrying.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed mobile or device id,
    /// `Cooldown`/`AttemptsExhausted` when the window denies the send,
    /// `ChannelUnavailable` when no channel is configured, and
    /// `DeliveryFailed` when the channel rejects the send.
    pub async fn request_code(
        &self,
        mobile: &str,
        device_id: &str,
    ) -> Result<OtpReceipt, OtpError> {
        let mobile = normalize_mobile(mobile)?;
        let device_id = normalize_device(device_id)?;

        let channel = self.channel.as_ref().ok_or(OtpError::ChannelUnavailable)?;

        let key = format!("{device_id}::{mobile}");
        let now = Instant::now();
        let (cooldown, ttl, max_attempts) = (self.cooldown, self.window_ttl, self.max_attempts);

        let window = self
            .store
            .with_window(&key, now, ttl, &mut |current| {
                admit(current, now, cooldown, ttl, max_attempts)
            })
            .await
            .map_err(|err| {
                debug!(%err, "OTP send denied");

                err
            })?;

        channel.send_code(&mobile).await.map_err(|err| {
            warn!(%err, provider = channel.name(), "OTP delivery failed");

            err
        })?;

        Ok(OtpReceipt {
            provider: channel.name(),
            attempts_used: window.attempts,
            attempts_remaining: max_attempts.saturating_sub(window.attempts),
            cooldown_seconds: cooldown.as_secs(),
            reset_in_seconds: ceil_seconds(
                ttl.saturating_sub(now.duration_since(window.started_at)),
            ),
        })
    }

    /// Check `code` against the channel for `mobile`.
    ///
    /// Verification is not rate limited; the send window governs issuance
    /// only. A verification limiter would attach at the `OtpWindowStore`
    /// seam.
    ///
    /// # Errors
    ///
    /// Returns `CodeRequired`/`CodeMismatch` for bad input,
    /// `ChannelUnavailable` when no channel is configured.
    pub async fn verify_code(&self, mobile: &str, code: &str) -> Result<(), OtpError> {
        let mobile = normalize_mobile(mobile)?;

        let code = code.trim();
        if code.is_empty() {
            return Err(OtpError::CodeRequired);
        }

        let channel = self.channel.as_ref().ok_or(OtpError::ChannelUnavailable)?;

        if channel.check_code(&mobile, code).await? {
            Ok(())
        } else {
            Err(OtpError::CodeMismatch)
        }
    }
}

/// Decide whether one more code may be issued for a window, returning the
/// updated window on admission.
fn admit(
    current: Option<&Window>,
    now: Instant,
    cooldown: Duration,
    ttl: Duration,
    max_attempts: u32,
) -> Result<Window, OtpError> {
    let Some(current) = current else {
        return Ok(Window {
            attempts: 1,
            started_at: now,
            last_sent_at: now,
        });
    };

    let since_last = now.duration_since(current.last_sent_at);
    if since_last < cooldown {
        return Err(OtpError::Cooldown {
            retry_after_seconds: ceil_seconds(cooldown - since_last),
        });
    }

    if current.attempts >= max_attempts {
        let remaining = ttl.saturating_sub(now.duration_since(current.started_at));
        return Err(OtpError::AttemptsExhausted {
            retry_after_seconds: ceil_seconds(remaining),
        });
    }

    Ok(Window {
        attempts: current.attempts + 1,
        started_at: current.started_at,
        last_sent_at: now,
    })
}

/// Round a duration up to whole seconds so "retry after" never understates
/// the wait.
fn ceil_seconds(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

static MOBILE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{10}$").expect("mobile pattern compiles"));

/// Exactly ten ASCII digits.
#[must_use]
pub fn valid_mobile(mobile: &str) -> bool {
    MOBILE_PATTERN.is_match(mobile)
}

fn normalize_mobile(raw: &str) -> Result<String, OtpError> {
    let mobile = raw.trim();

    if valid_mobile(mobile) {
        Ok(mobile.to_string())
    } else {
        Err(OtpError::InvalidDestination)
    }
}

fn normalize_device(raw: &str) -> Result<String, OtpError> {
    let device_id = raw.trim();

    if device_id.len() >= 6 {
        Ok(device_id.to_string())
    } else {
        Err(OtpError::InvalidDevice)
    }
}
