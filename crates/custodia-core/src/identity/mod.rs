//! User accounts and the closed role enumeration.
//!
//! Roles are a fixed set with fixed capability tables (see [`crate::authz`]);
//! they are never free text and callers never re-check them ad hoc. The
//! registry is the leaf dependency for every authorization decision.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::store::Store;

/// Closed role enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Full administrative authority.
    Admin,
    /// Station supervisor; first-tier approver.
    Supervisor,
    /// Runs a storage location; receives transfers.
    WarehouseManager,
    /// Registers seizures in the field.
    FieldOfficer,
    /// Read-only audit access.
    Auditor,
}

impl Role {
    /// Stable string form used in storage and configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Supervisor => "Supervisor",
            Self::WarehouseManager => "WarehouseManager",
            Self::FieldOfficer => "FieldOfficer",
            Self::Auditor => "Auditor",
        }
    }

    /// Parses the storage string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Admin" => Some(Self::Admin),
            "Supervisor" => Some(Self::Supervisor),
            "WarehouseManager" => Some(Self::WarehouseManager),
            "FieldOfficer" => Some(Self::FieldOfficer),
            "Auditor" => Some(Self::Auditor),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Account id.
    pub id: String,
    /// Unique login name.
    pub username: String,
    /// Human-readable name.
    pub display_name: String,
    /// The account's role.
    pub role: Role,
    /// Station assignment, if any.
    pub station: Option<String>,
    /// Deactivated accounts fail login and every authorization check.
    pub active: bool,
    /// Whether the external MFA collaborator is enabled for this account.
    pub mfa_enabled: bool,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

/// Input for creating a user account.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    /// Unique login name.
    pub username: String,
    /// Human-readable name.
    pub display_name: String,
    /// The account's role.
    pub role: Role,
    /// Station assignment, if any.
    #[serde(default)]
    pub station: Option<String>,
    /// Initial password.
    pub password: String,
    /// Whether MFA is enabled for this account.
    #[serde(default)]
    pub mfa_enabled: bool,
}

/// Hashes a password with a fresh random salt.
///
/// The stored form is `<salt>$<hex digest>`. This is a salted digest, not a
/// tunable KDF; stronger password storage is an external concern.
#[must_use]
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{salt}${}", digest(&salt, password))
}

/// Verifies a candidate password against a stored `<salt>$<hex>` hash in
/// constant time.
#[must_use]
pub fn verify_password(stored: &str, candidate: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    let actual = digest(salt, candidate);
    actual.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b"\x00");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Identity and role registry backed by the shared store.
pub struct Registry {
    store: Arc<Store>,
}

impl Registry {
    /// Creates a registry over the shared store.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Creates a user account.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty username or password, or a
    /// duplicate username.
    pub fn create_user(&self, new: &NewUser) -> Result<User, WorkflowError> {
        if new.username.trim().is_empty() {
            return Err(WorkflowError::Validation("username is required".into()));
        }
        if new.password.is_empty() {
            return Err(WorkflowError::Validation("password is required".into()));
        }
        if self.store.get_user_by_username(&new.username)?.is_some() {
            return Err(WorkflowError::Validation(format!(
                "username already exists: {}",
                new.username
            )));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            username: new.username.clone(),
            display_name: new.display_name.clone(),
            role: new.role,
            station: new.station.clone(),
            active: true,
            mfa_enabled: new.mfa_enabled,
            created_at: Utc::now(),
        };
        let password_hash = hash_password(&new.password);
        self.store.insert_user(&user, &password_hash)?;
        tracing::info!(username = %user.username, role = %user.role, "user created");
        Ok(user)
    }

    /// Looks up a user by username.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown username.
    pub fn get_by_username(&self, username: &str) -> Result<User, WorkflowError> {
        self.store
            .get_user_by_username(username)?
            .ok_or_else(|| WorkflowError::not_found("user", username))
    }

    /// Lists all user accounts.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the store cannot be read.
    pub fn list_users(&self) -> Result<Vec<User>, WorkflowError> {
        Ok(self.store.list_users()?)
    }

    /// Deactivates an account. Existing sessions become unusable and every
    /// subsequent authorization check for the account denies.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown user id.
    pub fn deactivate(&self, user_id: &str) -> Result<User, WorkflowError> {
        let user = self
            .store
            .deactivate_user(user_id)?
            .ok_or_else(|| WorkflowError::not_found("user", user_id))?;
        tracing::warn!(username = %user.username, "user deactivated");
        Ok(user)
    }

    /// Verifies login credentials.
    ///
    /// Returns the account on success. Unknown usernames, wrong passwords
    /// and deactivated accounts all produce the same `Validation` error so
    /// the response does not leak which part failed.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on any credential failure.
    pub fn verify_login(&self, username: &str, password: &str) -> Result<User, WorkflowError> {
        let denied = || WorkflowError::Validation("invalid credentials".into());

        let Some((user, password_hash)) = self.store.get_user_with_credentials(username)? else {
            return Err(denied());
        };
        if !user.active || !verify_password(&password_hash, password) {
            return Err(denied());
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_strings_round_trip() {
        for role in [
            Role::Admin,
            Role::Supervisor,
            Role::WarehouseManager,
            Role::FieldOfficer,
            Role::Auditor,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("SuperAdmin"), None);
    }

    #[test]
    fn password_hash_verifies_and_rejects() {
        let stored = hash_password("hunter2");
        assert!(verify_password(&stored, "hunter2"));
        assert!(!verify_password(&stored, "hunter3"));
        assert!(!verify_password("not-a-valid-hash", "hunter2"));
    }

    #[test]
    fn password_hashes_are_salted() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }
}
