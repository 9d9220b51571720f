use uuid::Uuid;
use validator::Validate;

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::models::{NewUser, UpdateProfile, User};
use crate::store::{DiscoveryStore, StoreError};

/// Creates the directory entry for a newly registered user.
/// Called by the identity service on sign-up, first OAuth login or first magic-link login.
pub fn provision_user<S: DiscoveryStore>(
    store: &S,
    email: &str,
    name: &str,
    password_hash: Option<String>,
) -> DiscoveryResult<User> {
    let email = email.trim().to_lowercase();
    if !validator::validate_email(email.as_str()) {
        return Err(DiscoveryError::Validation("email is not a valid address".into()));
    }
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(DiscoveryError::Validation("name must be 1 to 100 characters".into()));
    }

    let new_user = NewUser {
        email,
        name: name.to_string(),
        password_hash: password_hash.unwrap_or_default(),
    };

    let user = store.insert_user(&new_user).map_err(|e| match e {
        StoreError::UniqueViolation(_) => DiscoveryError::EmailTaken,
        other => DiscoveryError::Storage(other),
    })?;

    tracing::info!(user_id = %user.id, "user provisioned");
    Ok(user)
}

pub fn get_profile<S: DiscoveryStore>(store: &S, user_id: Uuid) -> DiscoveryResult<User> {
    store
        .find_user(user_id)?
        .ok_or_else(|| DiscoveryError::NotFound("profile not found".into()))
}

/// Names are trimmed before validation, so a blank name is rejected rather than stored empty.
pub fn update_profile<S: DiscoveryStore>(store: &S, user_id: Uuid, patch: &UpdateProfile) -> DiscoveryResult<User> {
    let mut patch = patch.clone();
    if let Some(name) = patch.name.as_mut() {
        *name = name.trim().to_string();
    }
    patch
        .validate()
        .map_err(|e| DiscoveryError::Validation(e.to_string()))?;

    let updated = store
        .update_user(user_id, &patch)?
        .ok_or_else(|| DiscoveryError::NotFound("profile not found".into()))?;

    tracing::debug!(user_id = %user_id, "profile updated");
    Ok(updated)
}
