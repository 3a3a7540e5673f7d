//! Atomic sequence allocator for durable human-facing IDs.
//!
//! Every numeric ID in the system (user ids, society ids, registration ids,
//! per-society member numbers) comes from a named counter row. The counter is
//! created lazily at `start_at - 1` with insert-if-absent semantics, then
//! bumped with a single-statement atomic increment, so N concurrent callers
//! for the same key always receive N distinct, contiguous values.

use sqlx::{PgPool, Row};
use tracing::Instrument;

/// Default starting value for most counters (`user_id_seq`, `society_id_seq`).
pub const DEFAULT_START: i64 = 1000;

/// Counter key for durable society ids, assigned on approval.
pub const SOCIETY_ID_SEQ: &str = "society_id_seq";

/// Counter key for society registration ids, assigned at submission.
pub const SOCIETY_REGISTRATION_SEQ: &str = "society_registration_seq";

/// Starting value for society registration ids.
pub const SOCIETY_REGISTRATION_START: i64 = 100_000;

/// Counter key for durable user ids.
pub const USER_ID_SEQ: &str = "user_id_seq";

#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    /// The backing store rejected or never answered the allocation. Callers
    /// must surface this; fabricating an ID locally would break uniqueness.
    #[error("sequence store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),
}

/// Per-society member number counter key.
#[must_use]
pub fn member_seq_key(society_id: i64) -> String {
    format!("society_{society_id}_member_seq")
}

/// Allocate the next value for `key`, initializing the counter at
/// `start_at - 1` on first use.
///
/// The two statements are individually atomic: the insert never overwrites a
/// counter created by a concurrent caller, and the increment both bumps and
/// reads in one round trip.
///
/// # Errors
///
/// Returns `SequenceError::StoreUnavailable` if the store cannot be reached
/// or either statement fails.
pub async fn next(pool: &PgPool, key: &str, start_at: i64) -> Result<i64, SequenceError> {
    let query = r"
        INSERT INTO counters (key, value)
        VALUES ($1, $2 - 1)
        ON CONFLICT (key) DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(key)
        .bind(start_at)
        .execute(pool)
        .instrument(span)
        .await?;

    let query = r"
        UPDATE counters
        SET value = value + 1
        WHERE key = $1
        RETURNING value
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(key)
        .fetch_one(pool)
        .instrument(span)
        .await?;

    Ok(row.get("value"))
}
