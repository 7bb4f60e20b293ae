// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! User repository.
//!
//! Users carry the local identity, their marketplace role, and the KYC state
//! mirrored from the provider. The provider-assigned external id is indexed
//! so webhook handlers can resolve remote events to local users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{Database, StorageError, StorageResult, USERS};

/// Marketplace role of a stored user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Buyer,
    Seller,
    Admin,
}

/// KYC verification state mirrored from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    /// No verification session exists yet.
    NotStarted,
    /// A provider session was opened and is in progress.
    Initiated,
    /// Verification succeeded.
    Passed,
    /// Verification failed.
    Rejected,
}

impl KycStatus {
    /// Terminal statuses are no longer reconciled against the provider.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Rejected)
    }
}

/// Persisted user record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredUser {
    /// Local user identifier (UUID).
    pub user_id: String,
    /// Contact email.
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Marketplace role.
    pub role: UserRole,
    /// Current KYC state.
    pub kyc_status: KycStatus,
    /// Provider-assigned external user id, once registered there.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_user_id: Option<String>,
    /// Provider KYC session id, once a session was opened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kyc_session_id: Option<String>,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredUser {
    /// Construct a new user with no provider linkage yet.
    pub fn new(
        user_id: String,
        email: String,
        first_name: String,
        last_name: String,
        role: UserRole,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            email,
            first_name,
            last_name,
            role,
            kyc_status: KycStatus::NotStarted,
            provider_user_id: None,
            kyc_session_id: None,
            email_verified: false,
            phone_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Repository for user records.
pub struct UserRepository<'a> {
    db: &'a Database,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Persist a new user.
    pub fn create(&self, user: &StoredUser) -> StorageResult<()> {
        let inserted = self.db.insert_json_if_absent(USERS, &user.user_id, user)?;
        if !inserted {
            return Err(StorageError::AlreadyExists(format!(
                "User {}",
                user.user_id
            )));
        }
        Ok(())
    }

    /// Get a user by local id.
    pub fn get(&self, user_id: &str) -> StorageResult<StoredUser> {
        self.db
            .get_json(USERS, user_id)?
            .ok_or_else(|| StorageError::NotFound(format!("User {user_id}")))
    }

    /// Update an existing user.
    pub fn update(&self, user: &StoredUser) -> StorageResult<()> {
        if self.db.get_json::<StoredUser>(USERS, &user.user_id)?.is_none() {
            return Err(StorageError::NotFound(format!("User {}", user.user_id)));
        }
        self.db.put_json(USERS, &user.user_id, user)
    }

    /// Resolve a provider external id to the local user, if known.
    pub fn get_by_provider_id(&self, provider_user_id: &str) -> StorageResult<Option<StoredUser>> {
        match self.db.lookup_provider_user(provider_user_id)? {
            Some(user_id) => Ok(Some(self.get(&user_id)?)),
            None => Ok(None),
        }
    }

    /// Record the provider-assigned external id and index it.
    pub fn link_provider(&self, user_id: &str, provider_user_id: &str) -> StorageResult<StoredUser> {
        let mut user = self.get(user_id)?;
        user.provider_user_id = Some(provider_user_id.to_string());
        user.updated_at = Utc::now();
        self.db.put_json(USERS, user_id, &user)?;
        self.db.index_provider_user(provider_user_id, user_id)?;
        Ok(user)
    }

    /// Set the KYC status (and optionally the session id).
    ///
    /// Assignment is idempotent: re-applying the same status is a no-op
    /// besides the `updated_at` touch.
    pub fn set_kyc_status(
        &self,
        user_id: &str,
        status: KycStatus,
        session_id: Option<&str>,
    ) -> StorageResult<StoredUser> {
        let mut user = self.get(user_id)?;
        user.kyc_status = status;
        if let Some(session_id) = session_id {
            user.kyc_session_id = Some(session_id.to_string());
        }
        user.updated_at = Utc::now();
        self.db.put_json(USERS, user_id, &user)?;
        Ok(user)
    }

    /// Count all users.
    pub fn count(&self) -> StorageResult<u64> {
        self.db.count(USERS)
    }
}
