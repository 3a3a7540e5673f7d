//! Society, user, and membership registry.
//!
//! `models` holds the row types and status enums, `storage` the database
//! helpers, and `service` the workflows that compose them: society
//! submission and approval, the login admission gate, and membership
//! maintenance with its denormalized `society_ids` projection.

pub mod models;
pub mod service;
mod storage;

pub use models::{
    Membership, MembershipStatus, NewSociety, NewUser, RecordKey, Society, SocietyStatus, User,
};

use crate::sequence::SequenceError;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Society not found")]
    SocietyNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Membership not found")]
    MembershipNotFound,

    /// The society either is not in `approved` status or cannot be resolved
    /// from a membership reference. Both block logins and new memberships.
    #[error("Society is not approved")]
    SocietyNotApproved,

    #[error("User already has a membership in this society")]
    DuplicateMembership,

    #[error("Member number is already taken in this society")]
    DuplicateMemberNumber,

    #[error("Phone number is already registered")]
    DuplicatePhone,

    #[error("Email is already registered")]
    DuplicateEmail,

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error("registry store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// SQLSTATE 23505.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Constraint name of a database error, when the driver reports one.
pub(crate) fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_unique_violation_matches_sqlstate() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        assert!(violated_constraint(&sqlx::Error::RowNotFound).is_none());
    }
}
