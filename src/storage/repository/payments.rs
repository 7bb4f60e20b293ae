// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Payment repository.
//!
//! Payments mirror provider-side transfers, keyed by the provider transaction
//! hash. TRANSACTION_COMPLETED webhooks resolve them to completed or failed;
//! an unknown hash is tolerated (the transfer may not concern this service).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{Database, StorageResult, PAYMENTS};

/// Settlement status of a mirrored payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

/// Persisted payment mirror.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredPayment {
    /// Provider transaction hash (primary key).
    pub tx_hash: String,
    /// Offer this payment settles, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer_id: Option<String>,
    pub user_id: String,
    /// Amount in the payment currency (decimal string).
    pub amount: String,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Repository for payment mirrors.
pub struct PaymentRepository<'a> {
    db: &'a Database,
}

impl<'a> PaymentRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create or update a payment mirror.
    pub fn upsert(&self, payment: &StoredPayment) -> StorageResult<()> {
        self.db.put_json(PAYMENTS, &payment.tx_hash, payment)
    }

    /// Get a payment by transaction hash.
    pub fn get(&self, tx_hash: &str) -> StorageResult<Option<StoredPayment>> {
        self.db.get_json(PAYMENTS, tx_hash)
    }

    /// Resolve a payment's status by transaction hash.
    ///
    /// Returns `false` when no payment with the hash exists; the caller
    /// logs and moves on, matching updateMany-by-hash semantics.
    pub fn set_status(&self, tx_hash: &str, status: PaymentStatus) -> StorageResult<bool> {
        match self.get(tx_hash)? {
            Some(mut payment) => {
                payment.status = status;
                payment.updated_at = Utc::now();
                self.upsert(&payment)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Count all payments.
    pub fn count(&self) -> StorageResult<u64> {
        self.db.count(PAYMENTS)
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

    fn sample_payment(hash: &str) -> StoredPayment {
        let now = Utc::now();
        StoredPayment {
            tx_hash: hash.to_string(),
            offer_id: Some("o1".to_string()),
            user_id: "user-1".to_string(),
            amount: "1000.00".to_string(),
            currency: "USDT".to_string(),
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn set_status_resolves_existing_payment() {
        let (db, _dir) = temp_db();
        let repo = PaymentRepository::new(&db);
        repo.upsert(&sample_payment("0xabc")).unwrap();

        assert!(repo.set_status("0xabc", PaymentStatus::Completed).unwrap());
        assert_eq!(
            repo.get("0xabc").unwrap().unwrap().status,
            PaymentStatus::Completed
        );
    }

    #[test]
    fn set_status_tolerates_unknown_hash() {
        let (db, _dir) = temp_db();
        let repo = PaymentRepository::new(&db);

        assert!(!repo.set_status("0xmissing", PaymentStatus::Failed).unwrap());
        assert_eq!(repo.count().unwrap(), 0);
    }
}
