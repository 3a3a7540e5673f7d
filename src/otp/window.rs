//! Per-key send windows backing the OTP rate limiter.
//!
//! A window tracks how many codes were issued for one `device::mobile` key
//! and when the last one went out. Windows expire lazily: a stale entry is
//! indistinguishable from no entry, so nothing ever sweeps the map on a
//! timer.

use super::OtpError;
use async_trait::async_trait;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

/// Minimum gap between two codes for the same key.
pub const RESEND_COOLDOWN: Duration = Duration::from_secs(60);

/// Length of the rolling attempt window; attempts reset when it lapses.
pub const WINDOW_TTL: Duration = Duration::from_secs(30 * 60);

/// Codes that may be issued per key within one window.
pub const MAX_ATTEMPTS: u32 = 3;

/// Send-window state for a single key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    /// Codes issued since `started_at`.
    pub attempts: u32,
    /// When the first code of this window was issued.
    pub started_at: Instant,
    /// When the most recent code was issued.
    pub last_sent_at: Instant,
}

/// Read-modify-write closure applied to the current window under the store's
/// per-key consistency guarantee.
pub type Admit<'a> = dyn FnMut(Option<&Window>) -> Result<Window, OtpError> + Send + 'a;

/// Where send windows live. The default is an in-process map; a shared
/// key-value store can implement this to serve multiple instances, as long
/// as `with_window` stays atomic per key.
#[async_trait]
pub trait OtpWindowStore: Send + Sync {
    /// Apply `admit` to the window for `key` and persist the result.
    ///
    /// Entries whose window started more than `ttl` ago are treated as
    /// absent. The closure runs while the key is held, so two concurrent
    /// callers for the same key observe each other's writes.
    async fn with_window(
        &self,
        key: &str,
        now: Instant,
        ttl: Duration,
        admit: &mut Admit<'_>,
    ) -> Result<Window, OtpError>;
}

/// In-process window store, one entry per `device::mobile` key.
#[derive(Debug, Default)]
pub struct InMemoryWindowStore {
    windows: Mutex<HashMap<String, Window>>,
}

impl InMemoryWindowStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OtpWindowStore for InMemoryWindowStore {
    async fn with_window(
        &self,
        key: &str,
        now: Instant,
        ttl: Duration,
        admit: &mut Admit<'_>,
    ) -> Result<Window, OtpError> {
        let mut windows = self.windows.lock().await;

        let current = windows
            .get(key)
            .copied()
            .filter(|window| now.duration_since(window.started_at) < ttl);

        if current.is_none() {
            windows.remove(key);
        }

        let next = admit(current.as_ref())?;
        windows.insert(key.to_string(), next);

        Ok(next)
    }
}
