//! Registry and sequence behavior against a disposable Postgres.
//!
//! Tests are skipped when no container runtime is reachable, so the rest of
//! the suite stays runnable on machines without Docker or Podman.

use anyhow::{Context, Result};
use samiti::{
    registry::{
        service::{self, MembershipRequest},
        NewSociety, NewUser, RecordKey, RegistryError, SocietyStatus,
    },
    sequence,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{env, os::unix::net::UnixStream, time::Duration};
use testcontainers_modules::{
    postgres::Postgres,
    testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt},
};

const SCHEMA_SQL: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/db/sql/01_samiti.sql"
));

/// testcontainers talks to the Docker API; skip when no socket answers.
fn container_runtime_available() -> std::result::Result<(), String> {
    if env::var("DOCKER_HOST").is_ok() {
        return Ok(());
    }

    UnixStream::connect("/var/run/docker.sock")
        .map(|_| ())
        .map_err(|err| format!("no container runtime socket: {err}"))
}

macro_rules! require_runtime {
    () => {
        if let Err(err) = container_runtime_available() {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }
    };
}

async fn test_pool() -> Result<(PgPool, ContainerAsync<Postgres>)> {
    let postgres = Postgres::default()
        .with_tag("16")
        .start()
        .await
        .context("Failed to start Postgres container")?;

    let host = postgres.get_host().await?;
    let port = postgres.get_host_port_ipv4(5432).await?;
    let dsn = format!("postgresql://postgres:postgres@{host}:{port}/postgres");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&dsn)
        .await?;

    sqlx::Executor::execute(&pool, SCHEMA_SQL)
        .await
        .context("failed to execute schema SQL")?;

    Ok((pool, postgres))
}

fn society(name: &str) -> NewSociety {
    NewSociety {
        name: name.to_string(),
        phone: None,
        email: None,
        address: None,
        city: Some("Pune".to_string()),
        district: None,
        state: Some("Maharashtra".to_string()),
        country: None,
        pincode: Some("411001".to_string()),
    }
}

fn user(name: &str, phone: &str) -> NewUser {
    NewUser {
        full_name: name.to_string(),
        phone: phone.to_string(),
        email: None,
        role: None,
    }
}

fn membership(user: RecordKey, society: RecordKey) -> MembershipRequest {
    MembershipRequest {
        user,
        society,
        role: None,
        society_role: None,
        status: None,
        society_user_id: None,
    }
}

#[tokio::test]
async fn sequence_values_are_contiguous_under_concurrency() -> Result<()> {
    require_runtime!();
    let (pool, _container) = test_pool().await?;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            sequence::next(&pool, "user_id_seq", 1000).await
        }));
    }

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await??);
    }
    values.sort_unstable();

    let expected: Vec<i64> = (1000..1020).collect();
    assert_eq!(values, expected);

    Ok(())
}

#[tokio::test]
async fn concurrent_approvals_assign_one_society_id() -> Result<()> {
    require_runtime!();
    let (pool, _container) = test_pool().await?;

    let submitted = service::submit_society(&pool, &society("Green Acres")).await?;
    assert_eq!(submitted.status, SocietyStatus::Pending);
    assert_eq!(submitted.registration_id, 100_000);
    assert!(submitted.society_id.is_none());

    let key = RecordKey::Row(submitted.id);
    let (first, second) = tokio::join!(
        service::approve_society(&pool, &key),
        service::approve_society(&pool, &key)
    );
    let first = first?;
    let second = second?;

    assert_eq!(first.status, SocietyStatus::Approved);
    assert_eq!(first.society_id, second.society_id);
    let society_id = first.society_id.expect("approved society has an id");
    assert!(society_id >= 1000);
    assert!(first.approved_at.is_some());

    // Re-approval keeps the original id.
    let again = service::approve_society(&pool, &key).await?;
    assert_eq!(again.society_id, Some(society_id));

    Ok(())
}

#[tokio::test]
async fn society_is_addressable_by_registration_and_society_id() -> Result<()> {
    require_runtime!();
    let (pool, _container) = test_pool().await?;

    let submitted = service::submit_society(&pool, &society("Green Acres")).await?;

    let by_registration =
        service::get_society(&pool, &RecordKey::Durable(submitted.registration_id)).await?;
    assert_eq!(by_registration.id, submitted.id);

    let approved = service::approve_society(&pool, &RecordKey::Row(submitted.id)).await?;
    let society_id = approved.society_id.expect("approved society has an id");

    let by_society_id = service::get_society(&pool, &RecordKey::Durable(society_id)).await?;
    assert_eq!(by_society_id.id, submitted.id);

    Ok(())
}

#[tokio::test]
async fn duplicate_membership_is_rejected() -> Result<()> {
    require_runtime!();
    let (pool, _container) = test_pool().await?;

    let submitted = service::submit_society(&pool, &society("Green Acres")).await?;
    let approved = service::approve_society(&pool, &RecordKey::Row(submitted.id)).await?;
    let society_id = approved.society_id.expect("approved society has an id");

    let member = service::create_user(&pool, &user("Asha Rao", "9876543210")).await?;

    let first = service::create_membership(
        &pool,
        &membership(
            RecordKey::Durable(member.user_id),
            RecordKey::Durable(society_id),
        ),
    )
    .await?;
    assert_eq!(first.society_user_id, 1);

    let second = service::create_membership(
        &pool,
        &membership(
            RecordKey::Durable(member.user_id),
            RecordKey::Durable(society_id),
        ),
    )
    .await;
    assert!(matches!(second, Err(RegistryError::DuplicateMembership)));

    let member = service::get_user(&pool, &RecordKey::Durable(member.user_id)).await?;
    assert_eq!(member.society_ids, vec![society_id]);

    Ok(())
}

#[tokio::test]
async fn explicit_member_number_collision_is_its_own_conflict() -> Result<()> {
    require_runtime!();
    let (pool, _container) = test_pool().await?;

    let submitted = service::submit_society(&pool, &society("Green Acres")).await?;
    let approved = service::approve_society(&pool, &RecordKey::Row(submitted.id)).await?;
    let society_id = approved.society_id.expect("approved society has an id");

    let asha = service::create_user(&pool, &user("Asha Rao", "9876543210")).await?;
    let ravi = service::create_user(&pool, &user("Ravi Kumar", "9123456780")).await?;

    let mut request = membership(
        RecordKey::Durable(asha.user_id),
        RecordKey::Durable(society_id),
    );
    request.society_user_id = Some(7);
    let first = service::create_membership(&pool, &request).await?;
    assert_eq!(first.society_user_id, 7);

    // A different user claiming the same number collides on the member
    // number, not on the membership pair.
    let mut request = membership(
        RecordKey::Durable(ravi.user_id),
        RecordKey::Durable(society_id),
    );
    request.society_user_id = Some(7);
    let taken = service::create_membership(&pool, &request).await;
    assert!(matches!(taken, Err(RegistryError::DuplicateMemberNumber)));

    Ok(())
}

#[tokio::test]
async fn member_numbers_are_per_society() -> Result<()> {
    require_runtime!();
    let (pool, _container) = test_pool().await?;

    let first_society = service::submit_society(&pool, &society("Green Acres")).await?;
    let first_society = service::approve_society(&pool, &RecordKey::Row(first_society.id)).await?;
    let second_society = service::submit_society(&pool, &society("Blue Hills")).await?;
    let second_society =
        service::approve_society(&pool, &RecordKey::Row(second_society.id)).await?;

    let first_id = first_society.society_id.expect("approved");
    let second_id = second_society.society_id.expect("approved");
    assert_ne!(first_id, second_id);

    let asha = service::create_user(&pool, &user("Asha Rao", "9876543210")).await?;
    let ravi = service::create_user(&pool, &user("Ravi Kumar", "9123456780")).await?;
    assert!(ravi.user_id > asha.user_id);

    // Two joiners in the first society get numbers 1 and 2; the second
    // society starts over at 1.
    let m1 = service::create_membership(
        &pool,
        &membership(
            RecordKey::Durable(asha.user_id),
            RecordKey::Durable(first_id),
        ),
    )
    .await?;
    let m2 = service::create_membership(
        &pool,
        &membership(
            RecordKey::Durable(ravi.user_id),
            RecordKey::Durable(first_id),
        ),
    )
    .await?;
    let m3 = service::create_membership(
        &pool,
        &membership(
            RecordKey::Durable(asha.user_id),
            RecordKey::Durable(second_id),
        ),
    )
    .await?;

    assert_eq!(m1.society_user_id, 1);
    assert_eq!(m2.society_user_id, 2);
    assert_eq!(m3.society_user_id, 1);

    Ok(())
}

#[tokio::test]
async fn membership_in_unapproved_society_is_rejected() -> Result<()> {
    require_runtime!();
    let (pool, _container) = test_pool().await?;

    let pending = service::submit_society(&pool, &society("Green Acres")).await?;
    let member = service::create_user(&pool, &user("Asha Rao", "9876543210")).await?;

    let result = service::create_membership(
        &pool,
        &membership(
            RecordKey::Durable(member.user_id),
            RecordKey::Row(pending.id),
        ),
    )
    .await;
    assert!(matches!(result, Err(RegistryError::SocietyNotApproved)));

    Ok(())
}

#[tokio::test]
async fn projection_is_pruned_with_the_last_membership() -> Result<()> {
    require_runtime!();
    let (pool, _container) = test_pool().await?;

    let submitted = service::submit_society(&pool, &society("Green Acres")).await?;
    let approved = service::approve_society(&pool, &RecordKey::Row(submitted.id)).await?;
    let society_id = approved.society_id.expect("approved");

    let member = service::create_user(&pool, &user("Asha Rao", "9876543210")).await?;
    let created = service::create_membership(
        &pool,
        &membership(
            RecordKey::Durable(member.user_id),
            RecordKey::Durable(society_id),
        ),
    )
    .await?;

    let removed = service::remove_membership(&pool, created.id).await?;
    assert_eq!(removed.id, created.id);

    let member = service::get_user(&pool, &RecordKey::Durable(member.user_id)).await?;
    assert!(member.society_ids.is_empty());

    let missing = service::remove_membership(&pool, created.id).await;
    assert!(matches!(missing, Err(RegistryError::MembershipNotFound)));

    Ok(())
}

#[tokio::test]
async fn admission_gate_blocks_suspended_societies_and_heals_drift() -> Result<()> {
    require_runtime!();
    let (pool, _container) = test_pool().await?;

    let submitted = service::submit_society(&pool, &society("Green Acres")).await?;
    let approved = service::approve_society(&pool, &RecordKey::Row(submitted.id)).await?;
    let society_id = approved.society_id.expect("approved");

    let member = service::create_user(&pool, &user("Asha Rao", "9876543210")).await?;
    service::create_membership(
        &pool,
        &membership(
            RecordKey::Durable(member.user_id),
            RecordKey::Durable(society_id),
        ),
    )
    .await?;

    let admitted = service::admit_user(&pool, "9876543210").await?;
    assert_eq!(admitted.society_ids, vec![society_id]);
    assert!(admitted.last_login_at.is_some());

    service::update_society_status(
        &pool,
        &RecordKey::Row(submitted.id),
        SocietyStatus::Suspended,
    )
    .await?;
    let blocked = service::admit_user(&pool, "9876543210").await;
    assert!(matches!(blocked, Err(RegistryError::SocietyNotApproved)));

    service::approve_society(&pool, &RecordKey::Row(submitted.id)).await?;

    // Wipe the projection behind the gate's back; admission rebuilds it.
    sqlx::query("UPDATE users SET society_ids = '{}' WHERE user_id = $1")
        .bind(member.user_id)
        .execute(&pool)
        .await?;
    let healed = service::admit_user(&pool, "9876543210").await?;
    assert_eq!(healed.society_ids, vec![society_id]);

    let unknown = service::admit_user(&pool, "9000000000").await;
    assert!(matches!(unknown, Err(RegistryError::UserNotFound)));

    Ok(())
}

#[tokio::test]
async fn failed_registration_removes_the_society_but_keeps_the_gap() -> Result<()> {
    require_runtime!();
    let (pool, _container) = test_pool().await?;

    // Occupy the phone the admin will try to register with.
    service::create_user(&pool, &user("Asha Rao", "9876543210")).await?;

    let result = service::register_society(
        &pool,
        &society("Green Acres"),
        &NewUser {
            full_name: "Asha Rao".to_string(),
            phone: "9876543210".to_string(),
            email: None,
            role: Some("admin".to_string()),
        },
    )
    .await;
    assert!(matches!(result, Err(RegistryError::DuplicatePhone)));

    let societies = service::list_societies(&pool, None).await?;
    assert!(societies.is_empty());

    // The registration id consumed by the failed attempt is never reused.
    let next = service::submit_society(&pool, &society("Blue Hills")).await?;
    assert_eq!(next.registration_id, 100_001);

    Ok(())
}

#[tokio::test]
async fn successful_registration_creates_pending_society_and_admin() -> Result<()> {
    require_runtime!();
    let (pool, _container) = test_pool().await?;

    let registration = service::register_society(
        &pool,
        &society("Green Acres"),
        &NewUser {
            full_name: "Asha Rao".to_string(),
            phone: "9876543210".to_string(),
            email: Some("asha@example.com".to_string()),
            role: Some("admin".to_string()),
        },
    )
    .await?;

    assert_eq!(registration.society.status, SocietyStatus::Pending);
    assert_eq!(registration.admin.role, "admin");
    assert_eq!(registration.admin.user_id, 1000);

    // The admin has no membership until the society is approved.
    let memberships =
        service::list_memberships(&pool, Some(registration.admin.user_id), None).await?;
    assert!(memberships.is_empty());

    Ok(())
}

#[tokio::test]
async fn phone_change_rejects_numbers_in_use() -> Result<()> {
    require_runtime!();
    let (pool, _container) = test_pool().await?;

    let asha = service::create_user(&pool, &user("Asha Rao", "9876543210")).await?;
    service::create_user(&pool, &user("Ravi Kumar", "9123456780")).await?;

    let taken =
        service::change_user_phone(&pool, &RecordKey::Durable(asha.user_id), "9123456780").await;
    assert!(matches!(taken, Err(RegistryError::DuplicatePhone)));

    let changed =
        service::change_user_phone(&pool, &RecordKey::Durable(asha.user_id), "9000000001").await?;
    assert_eq!(changed.phone, "9000000001");

    Ok(())
}
