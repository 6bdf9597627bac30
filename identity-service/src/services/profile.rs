use std::sync::Arc;
use uuid::Uuid;

use super::directory::{DirectoryError, UserDirectory};
use super::error::IdentityError;
use crate::models::{canonical_identifier, LocalUser, Profile};

/// Read-through profile lookups against the local directory.
pub struct ProfileService {
    directory: Arc<dyn UserDirectory>,
}

impl ProfileService {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    pub async fn get_profile(&self, user_id: Uuid) -> Result<Profile, IdentityError> {
        let user = self.directory.find_by_id(user_id).await;
        to_profile(user, || format!("user_id={}", user_id))
    }

    /// Lookup by principal; matched against the stored lowercase form.
    pub async fn get_profile_by_username(&self, username: &str) -> Result<Profile, IdentityError> {
        let username = canonical_identifier(username);
        let user = self.directory.find_by_username(&username).await;
        to_profile(user, || format!("username={}", username))
    }
}

fn to_profile<F>(
    result: Result<Option<LocalUser>, DirectoryError>,
    key: F,
) -> Result<Profile, IdentityError>
where
    F: Fn() -> String,
{
    match result {
        Ok(Some(user)) => Ok(user.into()),
        Ok(None) => {
            tracing::debug!(key = %key(), "Profile not found");
            Err(IdentityError::NotFound)
        }
        Err(e) => {
            tracing::error!(key = %key(), error = %e, "Profile lookup failed");
            Err(IdentityError::Internal)
        }
    }
}
