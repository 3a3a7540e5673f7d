//! Registry workflows.
//!
//! These compose the single-statement storage helpers into the multi-step
//! flows: society submission and approval, combined society+admin
//! registration, the login admission gate, and membership maintenance.
//! Multi-step writes compensate on failure instead of wrapping a
//! transaction, because allocated sequence values must never be reused even
//! when the enclosing write fails.

use super::{
    models::{
        Membership, MembershipStatus, NewSociety, NewUser, RecordKey, Society, SocietyStatus, User,
    },
    storage, RegistryError,
};
use crate::sequence::{
    self, member_seq_key, DEFAULT_START, SOCIETY_ID_SEQ, SOCIETY_REGISTRATION_SEQ,
    SOCIETY_REGISTRATION_START, USER_ID_SEQ,
};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of the combined society + admin registration flow.
#[derive(Clone, Debug)]
pub struct Registration {
    pub society: Society,
    pub admin: User,
}

/// Membership creation parameters, already parsed at the API boundary.
#[derive(Clone, Debug)]
pub struct MembershipRequest {
    pub user: RecordKey,
    pub society: RecordKey,
    pub role: Option<String>,
    pub society_role: Option<String>,
    pub status: Option<MembershipStatus>,
    /// Explicit member number; allocated from the per-society sequence when
    /// absent.
    pub society_user_id: Option<i64>,
}

/// Submit a society for review. Allocates the registration id and stores the
/// record as `pending`.
///
/// # Errors
///
/// Returns `RegistryError` when allocation or the insert fails.
pub async fn submit_society(pool: &PgPool, society: &NewSociety) -> Result<Society, RegistryError> {
    let registration_id =
        sequence::next(pool, SOCIETY_REGISTRATION_SEQ, SOCIETY_REGISTRATION_START).await?;

    let society = storage::insert_society(pool, registration_id, society).await?;

    info!(
        registration_id = society.registration_id,
        name = %society.name,
        "Society submitted for review"
    );

    Ok(society)
}

pub async fn get_society(pool: &PgPool, key: &RecordKey) -> Result<Society, RegistryError> {
    storage::fetch_society(pool, key)
        .await?
        .ok_or(RegistryError::SocietyNotFound)
}

pub async fn list_societies(
    pool: &PgPool,
    status: Option<SocietyStatus>,
) -> Result<Vec<Society>, RegistryError> {
    storage::list_societies(pool, status).await
}

/// Approve a society, assigning its durable id exactly once.
///
/// Two concurrent approvals may both allocate from `society_id_seq`, but the
/// conditional assignment lets only one value land; the loser's value is
/// discarded, never reused. Re-approving keeps the original id and
/// `approved_at`.
///
/// # Errors
///
/// Returns `SocietyNotFound` for an unknown key, otherwise storage errors.
pub async fn approve_society(pool: &PgPool, key: &RecordKey) -> Result<Society, RegistryError> {
    let society = get_society(pool, key).await?;

    if society.society_id.is_some() {
        return storage::set_society_status(pool, society.id, SocietyStatus::Approved)
            .await?
            .ok_or(RegistryError::SocietyNotFound);
    }

    let society_id = sequence::next(pool, SOCIETY_ID_SEQ, DEFAULT_START).await?;

    if storage::assign_society_id(pool, society.id, society_id).await? {
        info!(
            registration_id = society.registration_id,
            society_id, "Society approved"
        );
    } else {
        // Lost the race: someone else assigned an id first.
        warn!(
            registration_id = society.registration_id,
            discarded = society_id,
            "Concurrent approval already assigned a society id"
        );
    }

    get_society(pool, &RecordKey::Row(society.id)).await
}

/// Move a society to a non-approved status, or delegate to the approval flow
/// when the target status is `approved`.
///
/// # Errors
///
/// Returns `SocietyNotFound` for an unknown key, otherwise storage errors.
pub async fn update_society_status(
    pool: &PgPool,
    key: &RecordKey,
    status: SocietyStatus,
) -> Result<Society, RegistryError> {
    if status == SocietyStatus::Approved {
        return approve_society(pool, key).await;
    }

    let society = get_society(pool, key).await?;

    storage::set_society_status(pool, society.id, status)
        .await?
        .ok_or(RegistryError::SocietyNotFound)
}

/// Register a society together with its admin user.
///
/// The caller has already verified ownership of the admin's mobile number
/// via a registration assertion. When the user insert fails, the freshly
/// created society row is deleted again; the consumed sequence values leave
/// a gap, by the same rule that applies to lost approval races.
///
/// # Errors
///
/// Returns `DuplicatePhone`/`DuplicateEmail` when the admin collides with an
/// existing user, otherwise storage errors.
pub async fn register_society(
    pool: &PgPool,
    society: &NewSociety,
    admin: &NewUser,
) -> Result<Registration, RegistryError> {
    let society = submit_society(pool, society).await?;

    let admin = match create_user(pool, admin).await {
        Ok(admin) => admin,
        Err(err) => {
            if let Err(cleanup) = storage::delete_society(pool, society.id).await {
                warn!(
                    registration_id = society.registration_id,
                    %cleanup,
                    "Failed to remove society after admin creation failed"
                );
            }
            return Err(err);
        }
    };

    info!(
        registration_id = society.registration_id,
        admin_user_id = admin.user_id,
        "Society registered with admin"
    );

    Ok(Registration { society, admin })
}

/// Create a user with a freshly allocated durable id.
///
/// # Errors
///
/// Returns `DuplicatePhone`/`DuplicateEmail` on collisions, otherwise
/// storage errors.
pub async fn create_user(pool: &PgPool, user: &NewUser) -> Result<User, RegistryError> {
    let user_id = sequence::next(pool, USER_ID_SEQ, DEFAULT_START).await?;

    storage::insert_user(pool, user_id, user).await
}

pub async fn get_user(pool: &PgPool, key: &RecordKey) -> Result<User, RegistryError> {
    storage::fetch_user(pool, key)
        .await?
        .ok_or(RegistryError::UserNotFound)
}

/// Change a user's phone number. OTP proof of ownership happens at the API
/// boundary before this is called.
///
/// # Errors
///
/// Returns `UserNotFound` or `DuplicatePhone`, otherwise storage errors.
pub async fn change_user_phone(
    pool: &PgPool,
    key: &RecordKey,
    phone: &str,
) -> Result<User, RegistryError> {
    let user = get_user(pool, key).await?;

    storage::update_user_phone(pool, user.user_id, phone)
        .await?
        .ok_or(RegistryError::UserNotFound)
}

/// Admission gate for logins.
///
/// Resolves the user by phone, rebuilds the `society_ids` projection from
/// active memberships when it has drifted, and requires every referenced
/// society to be approved. Users without any membership pass the gate.
///
/// # Errors
///
/// Returns `UserNotFound` for an unknown phone and `SocietyNotApproved`
/// when any referenced society is missing or not approved.
pub async fn admit_user(pool: &PgPool, phone: &str) -> Result<User, RegistryError> {
    let mut user = storage::fetch_user_by_phone(pool, phone)
        .await?
        .ok_or(RegistryError::UserNotFound)?;

    let society_ids = storage::active_society_ids(pool, user.user_id).await?;

    for society_id in &society_ids {
        let society = storage::fetch_society_by_society_id(pool, *society_id)
            .await?
            .ok_or(RegistryError::SocietyNotApproved)?;

        if society.status != SocietyStatus::Approved {
            warn!(
                user_id = user.user_id,
                society_id,
                status = society.status.as_str(),
                "Login blocked, society not approved"
            );
            return Err(RegistryError::SocietyNotApproved);
        }
    }

    if user.society_ids != society_ids {
        storage::set_user_society_ids(pool, user.user_id, &society_ids).await?;
        user.society_ids = society_ids;
    }

    storage::touch_last_login(pool, user.user_id).await?;

    Ok(user)
}

/// Create a membership and maintain the user-side projection.
///
/// The member number comes from the per-society sequence unless supplied.
/// When the projection update fails after the membership row landed, the row
/// is deleted again so the two never stay out of step.
///
/// # Errors
///
/// Returns `UserNotFound`/`SocietyNotFound` for unknown keys,
/// `SocietyNotApproved` when the society cannot receive members,
/// `DuplicateMembership` on a second membership for the same pair, and
/// `DuplicateMemberNumber` when a supplied member number is taken.
pub async fn create_membership(
    pool: &PgPool,
    request: &MembershipRequest,
) -> Result<Membership, RegistryError> {
    let user = get_user(pool, &request.user).await?;
    let society = get_society(pool, &request.society).await?;

    if society.status != SocietyStatus::Approved {
        return Err(RegistryError::SocietyNotApproved);
    }
    let society_id = ensure_society_id(pool, &society).await?;

    let society_user_id = match request.society_user_id {
        Some(id) => id,
        None => sequence::next(pool, &member_seq_key(society_id), 1).await?,
    };

    let role = request.role.as_deref().unwrap_or("member");
    let society_role = request.society_role.as_deref().unwrap_or("society member");
    let status = request.status.unwrap_or(MembershipStatus::Active);

    let membership = storage::insert_membership(
        pool,
        user.user_id,
        society_id,
        society_user_id,
        role,
        society_role,
        status,
    )
    .await?;

    if let Err(err) = storage::attach_society(pool, user.user_id, society_id, role).await {
        warn!(
            user_id = user.user_id,
            society_id, "Rolling back membership after projection update failed"
        );
        remove_membership_row(pool, membership.id).await;
        return Err(err);
    }

    info!(
        user_id = user.user_id,
        society_id, society_user_id, "Membership created"
    );

    Ok(membership)
}

/// Delete a membership; the projection entry is pruned only when this was
/// the last membership linking the pair.
///
/// # Errors
///
/// Returns `MembershipNotFound` for an unknown id, otherwise storage errors.
pub async fn remove_membership(pool: &PgPool, id: Uuid) -> Result<Membership, RegistryError> {
    let membership = storage::delete_membership(pool, id)
        .await?
        .ok_or(RegistryError::MembershipNotFound)?;

    let remaining =
        storage::count_memberships(pool, membership.user_id, membership.society_id).await?;
    if remaining == 0 {
        storage::detach_society(pool, membership.user_id, membership.society_id).await?;
    }

    Ok(membership)
}

pub async fn get_membership(pool: &PgPool, id: Uuid) -> Result<Membership, RegistryError> {
    storage::fetch_membership(pool, id)
        .await?
        .ok_or(RegistryError::MembershipNotFound)
}

pub async fn list_memberships(
    pool: &PgPool,
    user_id: Option<i64>,
    society_id: Option<i64>,
) -> Result<Vec<Membership>, RegistryError> {
    storage::list_memberships(pool, user_id, society_id).await
}

/// Durable id of an approved society, lazily assigned for records approved
/// before id assignment existed.
async fn ensure_society_id(pool: &PgPool, society: &Society) -> Result<i64, RegistryError> {
    if let Some(society_id) = society.society_id {
        return Ok(society_id);
    }

    let society_id = sequence::next(pool, SOCIETY_ID_SEQ, DEFAULT_START).await?;

    if storage::assign_society_id(pool, society.id, society_id).await? {
        return Ok(society_id);
    }

    // A concurrent caller assigned first; read theirs.
    get_society(pool, &RecordKey::Row(society.id))
        .await?
        .society_id
        .ok_or(RegistryError::SocietyNotApproved)
}

async fn remove_membership_row(pool: &PgPool, id: Uuid) {
    if let Err(err) = storage::delete_membership(pool, id).await {
        warn!(membership = %id, %err, "Failed to roll back membership row");
    }
}
