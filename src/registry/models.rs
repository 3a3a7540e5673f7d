//! Row types and status enums for the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of a society. Only `approved` societies carry a durable
/// `society_id` and may receive members.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SocietyStatus {
    Pending,
    Approved,
    Rejected,
    Suspended,
}

impl SocietyStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Suspended => "suspended",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "suspended" => Some(Self::Suspended),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Active,
    Inactive,
    Pending,
}

impl MembershipStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Pending => "pending",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct Society {
    pub id: Uuid,
    /// Assigned at submission, before any review happens.
    pub registration_id: i64,
    /// Assigned exactly once, on first approval.
    pub society_id: Option<i64>,
    pub name: String,
    pub status: SocietyStatus,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub state: Option<String>,
    pub country: String,
    pub pincode: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Society fields accepted at submission time.
#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct NewSociety {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub pincode: Option<String>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    /// Durable human-facing id from `user_id_seq`.
    pub user_id: i64,
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub role: String,
    /// Denormalized projection of the user's active memberships.
    pub society_ids: Vec<i64>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User fields accepted at creation time.
#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct NewUser {
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct Membership {
    pub id: Uuid,
    pub user_id: i64,
    pub society_id: i64,
    /// Member number, unique within the society.
    pub society_user_id: i64,
    pub role: String,
    pub society_role: String,
    pub status: MembershipStatus,
    pub joined_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Path key accepting either a durable numeric id or a row UUID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKey {
    Durable(i64),
    Row(Uuid),
}

impl RecordKey {
    /// Numeric strings resolve as durable ids, everything else must be a
    /// UUID.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();

        if let Ok(id) = raw.parse::<i64>() {
            return Some(Self::Durable(id));
        }

        raw.parse::<Uuid>().ok().map(Self::Row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn society_status_round_trips() {
        for status in [
            SocietyStatus::Pending,
            SocietyStatus::Approved,
            SocietyStatus::Rejected,
            SocietyStatus::Suspended,
        ] {
            assert_eq!(SocietyStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SocietyStatus::parse("deleted"), None);
    }

    #[test]
    fn membership_status_round_trips() {
        for status in [
            MembershipStatus::Active,
            MembershipStatus::Inactive,
            MembershipStatus::Pending,
        ] {
            assert_eq!(MembershipStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MembershipStatus::parse("banned"), None);
    }

    #[test]
    fn record_key_prefers_durable_ids() {
        assert_eq!(RecordKey::parse(" 1042 "), Some(RecordKey::Durable(1042)));

        let uuid = Uuid::new_v4();
        assert_eq!(
            RecordKey::parse(&uuid.to_string()),
            Some(RecordKey::Row(uuid))
        );

        assert_eq!(RecordKey::parse("not-a-key"), None);
    }
}
