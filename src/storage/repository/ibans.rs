// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Digital IBAN repository.
//!
//! IBANs are provisioned at the provider for sellers once KYC passes and
//! mirrored here on IBAN_CREATED events. Keyed by (user, iban) so redelivery
//! upserts instead of duplicating.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{composite_key, Database, StorageResult, IBANS};

/// Persisted digital IBAN.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredIban {
    pub user_id: String,
    pub iban: String,
    pub bank_name: String,
    pub account_number: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Repository for digital IBAN mirrors.
pub struct IbanRepository<'a> {
    db: &'a Database,
}

impl<'a> IbanRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create or update an IBAN mirror (idempotent under redelivery).
    pub fn upsert(&self, iban: &StoredIban) -> StorageResult<()> {
        self.db
            .put_json(IBANS, &composite_key(&iban.user_id, &iban.iban), iban)
    }

    /// List a user's IBANs.
    pub fn list_by_user(&self, user_id: &str) -> StorageResult<Vec<StoredIban>> {
        let prefix = format!("{user_id}|");
        self.db.scan_prefix_json(IBANS, &prefix)
    }

    /// Count all IBANs.
    pub fn count(&self) -> StorageResult<u64> {
        self.db.count(IBANS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn sample_iban(user: &str, iban: &str) -> StoredIban {
        StoredIban {
            user_id: user.to_string(),
            iban: iban.to_string(),
            bank_name: "Example Bank".to_string(),
            account_number: "0001".to_string(),
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_is_idempotent() {
        let (db, _dir) = temp_db();
        let repo = IbanRepository::new(&db);

        let iban = sample_iban("user-1", "PT50000201231234567890154");
        repo.upsert(&iban).unwrap();
        repo.upsert(&iban).unwrap();

        assert_eq!(repo.count().unwrap(), 1);
        let listed = repo.list_by_user("user-1").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].bank_name, "Example Bank");
    }

    #[test]
    fn list_filters_by_user() {
        let (db, _dir) = temp_db();
        let repo = IbanRepository::new(&db);
        repo.upsert(&sample_iban("user-1", "PT50A")).unwrap();
        repo.upsert(&sample_iban("user-2", "PT50B")).unwrap();

        assert_eq!(repo.list_by_user("user-1").unwrap().len(), 1);
        assert!(repo.list_by_user("user-3").unwrap().is_empty());
    }
}
