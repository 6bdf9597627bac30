//! Local user records - the directory's view of a provider account.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A user as stored in the local directory.
///
/// `external_id` is the provider-assigned account id; each one maps to at
/// most one local record.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct LocalUser {
    pub user_id: Uuid,
    pub external_id: String,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Canonical form of a username or email. The provider lowercases both, and
/// token principals carry its form.
pub fn canonical_identifier(value: &str) -> String {
    value.to_lowercase()
}

/// Fields needed to create a local record. The directory assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocalUser {
    pub external_id: String,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl LocalUser {
    /// Materialize a new record with a fresh id and timestamps.
    pub fn from_new(user: NewLocalUser) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            external_id: user.external_id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn profile(&self) -> Profile {
        Profile::from(self.clone())
    }
}

/// Public view of a local user (no provider identifiers).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<LocalUser> for Profile {
    fn from(u: LocalUser) -> Self {
        Self {
            id: u.user_id,
            username: u.username,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            created_at: u.created_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_new_stamps_matching_timestamps() {
        let user = LocalUser::from_new(NewLocalUser {
            external_id: "kc-1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            first_name: Some("Alice".to_string()),
            last_name: None,
        });

        assert_eq!(user.created_utc, user.updated_utc);
        assert_eq!(user.external_id, "kc-1");
    }

    #[test]
    fn profile_hides_external_id() {
        let user = LocalUser::from_new(NewLocalUser {
            external_id: "kc-1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            first_name: None,
            last_name: None,
        });

        let json = serde_json::to_value(user.profile()).unwrap();
        assert_eq!(json["username"], "alice");
        assert!(json.get("external_id").is_none());
    }
}
