//! Database helpers for the registry.
//!
//! Every mutation here is a single statement; the workflows in `service`
//! compose them and compensate when a later step fails. Unique violations
//! are mapped to domain errors by constraint name.

use super::{
    is_unique_violation,
    models::{
        Membership, MembershipStatus, NewSociety, NewUser, RecordKey, Society, SocietyStatus, User,
    },
    violated_constraint, RegistryError,
};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

const SOCIETY_COLUMNS: &str = "id, registration_id, society_id, name, status, phone, email, \
     address, city, district, state, country, pincode, approved_at, created_at, updated_at";

const USER_COLUMNS: &str =
    "id, user_id, full_name, phone, email, role, society_ids, is_active, last_login_at, \
     created_at, updated_at";

const MEMBERSHIP_COLUMNS: &str = "id, user_id, society_id, society_user_id, role, society_role, \
     status, joined_at, created_at, updated_at";

fn society_from_row(row: &PgRow) -> Result<Society, RegistryError> {
    let raw: String = row.get("status");
    let status = SocietyStatus::parse(&raw)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown society status: {raw}").into()))?;

    Ok(Society {
        id: row.get("id"),
        registration_id: row.get("registration_id"),
        society_id: row.get("society_id"),
        name: row.get("name"),
        status,
        phone: row.get("phone"),
        email: row.get("email"),
        address: row.get("address"),
        city: row.get("city"),
        district: row.get("district"),
        state: row.get("state"),
        country: row.get("country"),
        pincode: row.get("pincode"),
        approved_at: row.get("approved_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        user_id: row.get("user_id"),
        full_name: row.get("full_name"),
        phone: row.get("phone"),
        email: row.get("email"),
        role: row.get("role"),
        society_ids: row.get("society_ids"),
        is_active: row.get("is_active"),
        last_login_at: row.get("last_login_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn membership_from_row(row: &PgRow) -> Result<Membership, RegistryError> {
    let raw: String = row.get("status");
    let status = MembershipStatus::parse(&raw)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown membership status: {raw}").into()))?;

    Ok(Membership {
        id: row.get("id"),
        user_id: row.get("user_id"),
        society_id: row.get("society_id"),
        society_user_id: row.get("society_user_id"),
        role: row.get("role"),
        society_role: row.get("society_role"),
        status,
        joined_at: row.get("joined_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

pub(super) async fn insert_society(
    pool: &PgPool,
    registration_id: i64,
    society: &NewSociety,
) -> Result<Society, RegistryError> {
    let query = format!(
        r"
        INSERT INTO societies
            (registration_id, name, phone, email, address, city, district, state, country, pincode)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, 'India'), $10)
        RETURNING {SOCIETY_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(registration_id)
        .bind(&society.name)
        .bind(&society.phone)
        .bind(&society.email)
        .bind(&society.address)
        .bind(&society.city)
        .bind(&society.district)
        .bind(&society.state)
        .bind(&society.country)
        .bind(&society.pincode)
        .fetch_one(pool)
        .instrument(span)
        .await?;

    society_from_row(&row)
}

/// Durable keys match either the assigned `society_id` or the
/// `registration_id`, so pending societies stay addressable by number.
pub(super) async fn fetch_society(
    pool: &PgPool,
    key: &RecordKey,
) -> Result<Option<Society>, RegistryError> {
    let row = match key {
        RecordKey::Durable(id) => {
            let query = format!(
                "SELECT {SOCIETY_COLUMNS} FROM societies WHERE society_id = $1 OR registration_id = $1"
            );
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query.as_str()
            );
            sqlx::query(&query)
                .bind(id)
                .fetch_optional(pool)
                .instrument(span)
                .await?
        }
        RecordKey::Row(id) => {
            let query = format!("SELECT {SOCIETY_COLUMNS} FROM societies WHERE id = $1");
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query.as_str()
            );
            sqlx::query(&query)
                .bind(id)
                .fetch_optional(pool)
                .instrument(span)
                .await?
        }
    };

    row.as_ref().map(society_from_row).transpose()
}

pub(super) async fn fetch_society_by_society_id(
    pool: &PgPool,
    society_id: i64,
) -> Result<Option<Society>, RegistryError> {
    let query = format!("SELECT {SOCIETY_COLUMNS} FROM societies WHERE society_id = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(society_id)
        .fetch_optional(pool)
        .instrument(span)
        .await?;

    row.as_ref().map(society_from_row).transpose()
}

pub(super) async fn list_societies(
    pool: &PgPool,
    status: Option<SocietyStatus>,
) -> Result<Vec<Society>, RegistryError> {
    let query = format!(
        r"
        SELECT {SOCIETY_COLUMNS} FROM societies
        WHERE ($1::text IS NULL OR status = $1)
        ORDER BY registration_id
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(status.map(SocietyStatus::as_str))
        .fetch_all(pool)
        .instrument(span)
        .await?;

    rows.iter().map(society_from_row).collect()
}

/// Assign a durable id to a society that never had one, approving it in the
/// same statement. Returns `false` when another caller won the race.
pub(super) async fn assign_society_id(
    pool: &PgPool,
    row_id: Uuid,
    society_id: i64,
) -> Result<bool, RegistryError> {
    let query = r"
        UPDATE societies
        SET society_id = $2,
            status = 'approved',
            approved_at = COALESCE(approved_at, NOW()),
            updated_at = NOW()
        WHERE id = $1 AND society_id IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(row_id)
        .bind(society_id)
        .execute(pool)
        .instrument(span)
        .await?;

    Ok(result.rows_affected() == 1)
}

pub(super) async fn set_society_status(
    pool: &PgPool,
    row_id: Uuid,
    status: SocietyStatus,
) -> Result<Option<Society>, RegistryError> {
    let query = format!(
        r"
        UPDATE societies
        SET status = $2,
            approved_at = CASE WHEN $2 = 'approved' THEN COALESCE(approved_at, NOW())
                               ELSE approved_at END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {SOCIETY_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(row_id)
        .bind(status.as_str())
        .fetch_optional(pool)
        .instrument(span)
        .await?;

    row.as_ref().map(society_from_row).transpose()
}

/// Compensation for a failed registration; never part of the public surface.
pub(super) async fn delete_society(pool: &PgPool, row_id: Uuid) -> Result<(), RegistryError> {
    let query = "DELETE FROM societies WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(row_id)
        .execute(pool)
        .instrument(span)
        .await?;

    Ok(())
}

pub(super) async fn insert_user(
    pool: &PgPool,
    user_id: i64,
    user: &NewUser,
) -> Result<User, RegistryError> {
    let query = format!(
        r"
        INSERT INTO users (user_id, full_name, phone, email, role)
        VALUES ($1, $2, $3, $4, COALESCE($5, 'member'))
        RETURNING {USER_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .bind(&user.full_name)
        .bind(&user.phone)
        .bind(&user.email)
        .bind(&user.role)
        .fetch_one(pool)
        .instrument(span)
        .await
        .map_err(map_user_conflict)?;

    Ok(user_from_row(&row))
}

fn map_membership_conflict(err: sqlx::Error) -> RegistryError {
    if is_unique_violation(&err) {
        // A caller-supplied member number can collide independently of the
        // user/society pair.
        return match violated_constraint(&err) {
            Some("memberships_society_id_society_user_id_key") => {
                RegistryError::DuplicateMemberNumber
            }
            _ => RegistryError::DuplicateMembership,
        };
    }

    RegistryError::Store(err)
}

fn map_user_conflict(err: sqlx::Error) -> RegistryError {
    if is_unique_violation(&err) {
        match violated_constraint(&err) {
            Some("users_phone_key") => return RegistryError::DuplicatePhone,
            Some("users_email_key") => return RegistryError::DuplicateEmail,
            _ => {}
        }
    }

    RegistryError::Store(err)
}

pub(super) async fn fetch_user(
    pool: &PgPool,
    key: &RecordKey,
) -> Result<Option<User>, RegistryError> {
    let row = match key {
        RecordKey::Durable(id) => {
            let query = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1");
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query.as_str()
            );
            sqlx::query(&query)
                .bind(id)
                .fetch_optional(pool)
                .instrument(span)
                .await?
        }
        RecordKey::Row(id) => {
            let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query.as_str()
            );
            sqlx::query(&query)
                .bind(id)
                .fetch_optional(pool)
                .instrument(span)
                .await?
        }
    };

    Ok(row.as_ref().map(user_from_row))
}

pub(super) async fn fetch_user_by_phone(
    pool: &PgPool,
    phone: &str,
) -> Result<Option<User>, RegistryError> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE phone = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(phone)
        .fetch_optional(pool)
        .instrument(span)
        .await?;

    Ok(row.as_ref().map(user_from_row))
}

pub(super) async fn update_user_phone(
    pool: &PgPool,
    user_id: i64,
    phone: &str,
) -> Result<Option<User>, RegistryError> {
    let query = format!(
        r"
        UPDATE users
        SET phone = $2, updated_at = NOW()
        WHERE user_id = $1
        RETURNING {USER_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .bind(phone)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .map_err(map_user_conflict)?;

    Ok(row.as_ref().map(user_from_row))
}

pub(super) async fn touch_last_login(pool: &PgPool, user_id: i64) -> Result<(), RegistryError> {
    let query = "UPDATE users SET last_login_at = NOW(), updated_at = NOW() WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await?;

    Ok(())
}

/// Society ids of the user's active memberships, the authoritative source
/// the `users.society_ids` projection is rebuilt from.
pub(super) async fn active_society_ids(
    pool: &PgPool,
    user_id: i64,
) -> Result<Vec<i64>, RegistryError> {
    let query = r"
        SELECT society_id FROM memberships
        WHERE user_id = $1 AND status = 'active'
        ORDER BY society_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await?;

    Ok(rows.iter().map(|row| row.get("society_id")).collect())
}

pub(super) async fn set_user_society_ids(
    pool: &PgPool,
    user_id: i64,
    society_ids: &[i64],
) -> Result<(), RegistryError> {
    let query = "UPDATE users SET society_ids = $2, updated_at = NOW() WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(society_ids)
        .execute(pool)
        .instrument(span)
        .await?;

    Ok(())
}

/// Add-to-set on the projection plus the role mirror, one statement so
/// concurrent membership writes cannot drop each other's ids.
pub(super) async fn attach_society(
    pool: &PgPool,
    user_id: i64,
    society_id: i64,
    role: &str,
) -> Result<(), RegistryError> {
    let query = r"
        UPDATE users
        SET society_ids = CASE WHEN $2 = ANY(society_ids) THEN society_ids
                               ELSE array_append(society_ids, $2) END,
            role = $3,
            updated_at = NOW()
        WHERE user_id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(society_id)
        .bind(role)
        .execute(pool)
        .instrument(span)
        .await?;

    Ok(())
}

pub(super) async fn detach_society(
    pool: &PgPool,
    user_id: i64,
    society_id: i64,
) -> Result<(), RegistryError> {
    let query = r"
        UPDATE users
        SET society_ids = array_remove(society_ids, $2), updated_at = NOW()
        WHERE user_id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(society_id)
        .execute(pool)
        .instrument(span)
        .await?;

    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(super) async fn insert_membership(
    pool: &PgPool,
    user_id: i64,
    society_id: i64,
    society_user_id: i64,
    role: &str,
    society_role: &str,
    status: MembershipStatus,
) -> Result<Membership, RegistryError> {
    let query = format!(
        r"
        INSERT INTO memberships
            (user_id, society_id, society_user_id, role, society_role, status)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {MEMBERSHIP_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .bind(society_id)
        .bind(society_user_id)
        .bind(role)
        .bind(society_role)
        .bind(status.as_str())
        .fetch_one(pool)
        .instrument(span)
        .await
        .map_err(map_membership_conflict)?;

    membership_from_row(&row)
}

pub(super) async fn fetch_membership(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<Membership>, RegistryError> {
    let query = format!("SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE id = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await?;

    row.as_ref().map(membership_from_row).transpose()
}

pub(super) async fn list_memberships(
    pool: &PgPool,
    user_id: Option<i64>,
    society_id: Option<i64>,
) -> Result<Vec<Membership>, RegistryError> {
    let query = format!(
        r"
        SELECT {MEMBERSHIP_COLUMNS} FROM memberships
        WHERE ($1::bigint IS NULL OR user_id = $1)
          AND ($2::bigint IS NULL OR society_id = $2)
        ORDER BY society_id, society_user_id
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(user_id)
        .bind(society_id)
        .fetch_all(pool)
        .instrument(span)
        .await?;

    rows.iter().map(membership_from_row).collect()
}

pub(super) async fn delete_membership(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<Membership>, RegistryError> {
    let query = format!("DELETE FROM memberships WHERE id = $1 RETURNING {MEMBERSHIP_COLUMNS}");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await?;

    row.as_ref().map(membership_from_row).transpose()
}

/// Memberships of any status linking `user_id` to `society_id`. The
/// projection entry is pruned only when this reaches zero.
pub(super) async fn count_memberships(
    pool: &PgPool,
    user_id: i64,
    society_id: i64,
) -> Result<i64, RegistryError> {
    let query = "SELECT COUNT(*) AS total FROM memberships WHERE user_id = $1 AND society_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(society_id)
        .fetch_one(pool)
        .instrument(span)
        .await?;

    Ok(row.get("total"))
}
