// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Embedded marketplace database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user_id → serialized StoredUser
//! - `user_provider_index`: provider user id → user_id
//! - `properties`: property_id → serialized StoredProperty
//! - `documents`: composite key (property_id|document_id) → StoredDocument
//! - `offers`: offer_id → serialized StoredOffer
//! - `offer_history`: composite key (offer_id|seq) → StatusHistoryEntry
//! - `payments`: provider tx hash → StoredPayment
//! - `wallets`: composite key (user_id|currency) → StoredWallet
//! - `ibans`: composite key (user_id|iban) → StoredIban
//! - `webhook_events`: composite key (source|event_id) → StoredWebhookEvent
//! - `notifications`: composite key (user_id|notification_id) → StoredNotification
//!
//! Values are JSON bytes; composite keys use `|` as separator. redb has a
//! single writer, so `insert_if_absent` is an atomic claim: two concurrent
//! calls for the same key commit in sequence and exactly one observes the
//! key as absent.

use std::path::Path;

use redb::{
    Database as RedbDatabase, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition,
};
use serde::{de::DeserializeOwned, Serialize};

// =============================================================================
// Table Definitions
// =============================================================================

pub(crate) const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Index: provider-assigned external user id → local user_id.
pub(crate) const USER_PROVIDER_INDEX: TableDefinition<&str, &str> =
    TableDefinition::new("user_provider_index");

pub(crate) const PROPERTIES: TableDefinition<&str, &[u8]> = TableDefinition::new("properties");

/// Key format: `property_id|document_id`.
pub(crate) const DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");

pub(crate) const OFFERS: TableDefinition<&str, &[u8]> = TableDefinition::new("offers");

/// Key format: `offer_id|seq` with a zero-padded sequence for insertion order.
pub(crate) const OFFER_HISTORY: TableDefinition<&str, &[u8]> =
    TableDefinition::new("offer_history");

pub(crate) const PAYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("payments");

/// Key format: `user_id|currency`.
pub(crate) const WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallets");

/// Key format: `user_id|iban`.
pub(crate) const IBANS: TableDefinition<&str, &[u8]> = TableDefinition::new("ibans");

/// Key format: `source|event_id`, the idempotency key for webhook delivery.
pub(crate) const WEBHOOK_EVENTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("webhook_events");

/// Key format: `user_id|notification_id`.
pub(crate) const NOTIFICATIONS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("notifications");

const ALL_TABLES: [TableDefinition<&str, &[u8]>; 10] = [
    USERS,
    PROPERTIES,
    DOCUMENTS,
    OFFERS,
    OFFER_HISTORY,
    PAYMENTS,
    WALLETS,
    IBANS,
    WEBHOOK_EVENTS,
    NOTIFICATIONS,
];

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Key Helpers
// =============================================================================

/// Build a composite key from two parts using `|` as separator.
pub(crate) fn composite_key(left: &str, right: &str) -> String {
    format!("{left}|{right}")
}

// =============================================================================
// Database
// =============================================================================

/// Embedded ACID marketplace database.
pub struct Database {
    db: RedbDatabase,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = RedbDatabase::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            for table in ALL_TABLES {
                let _ = write_txn.open_table(table)?;
            }
            let _ = write_txn.open_table(USER_PROVIDER_INDEX)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Look up a single JSON value by key.
    pub(crate) fn get_json<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> StorageResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        match table.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Insert or overwrite a JSON value (upsert).
    pub(crate) fn put_json<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &T,
    ) -> StorageResult<()> {
        let json = serde_json::to_vec(value)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table)?;
            table.insert(key, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Insert a JSON value only if the key is absent.
    ///
    /// The existence check and insert happen inside one write transaction,
    /// and redb serializes writers, so exactly one of any number of
    /// concurrent callers for the same key returns `true`.
    pub(crate) fn insert_json_if_absent<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &T,
    ) -> StorageResult<bool> {
        let json = serde_json::to_vec(value)?;
        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut table = write_txn.open_table(table)?;
            if table.get(key)?.is_some() {
                false
            } else {
                table.insert(key, json.as_slice())?;
                true
            }
        };
        write_txn.commit()?;
        Ok(inserted)
    }

    /// Append a JSON value under `prefix|seq`, returning the sequence number.
    ///
    /// Sequence numbers are dense and zero-padded so lexicographic key order
    /// equals insertion order. Counting and inserting share one write
    /// transaction.
    pub(crate) fn append_json<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        prefix: &str,
        value: &T,
    ) -> StorageResult<u64> {
        let json = serde_json::to_vec(value)?;
        let scan_prefix = format!("{prefix}|");
        let write_txn = self.db.begin_write()?;
        let seq = {
            let mut table = write_txn.open_table(table)?;
            let mut seq = 0u64;
            for entry in table.range(scan_prefix.as_str()..)? {
                let entry = entry?;
                if !entry.0.value().starts_with(scan_prefix.as_str()) {
                    break;
                }
                seq += 1;
            }
            let key = format!("{prefix}|{seq:08}");
            table.insert(key.as_str(), json.as_slice())?;
            seq
        };
        write_txn.commit()?;
        Ok(seq)
    }

    /// List all JSON values whose key starts with `prefix`, in key order.
    pub(crate) fn scan_prefix_json<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        prefix: &str,
    ) -> StorageResult<Vec<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        let mut results = Vec::new();
        for entry in table.range(prefix..)? {
            let entry = entry?;
            if !entry.0.value().starts_with(prefix) {
                break;
            }
            results.push(serde_json::from_slice(entry.1.value())?);
        }
        Ok(results)
    }

    /// List every JSON value in a table, in key order.
    pub(crate) fn scan_all_json<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
    ) -> StorageResult<Vec<T>> {
        self.scan_prefix_json(table, "")
    }

    /// Count the rows in a table.
    pub(crate) fn count(&self, table: TableDefinition<&str, &[u8]>) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        Ok(table.len()?)
    }

    /// Insert or overwrite an entry in the provider user index.
    pub(crate) fn index_provider_user(
        &self,
        provider_user_id: &str,
        user_id: &str,
    ) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(USER_PROVIDER_INDEX)?;
            table.insert(provider_user_id, user_id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Resolve a provider external user id to the local user id.
    pub(crate) fn lookup_provider_user(
        &self,
        provider_user_id: &str,
    ) -> StorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USER_PROVIDER_INDEX)?;
        match table.get(provider_user_id)? {
            Some(v) => Ok(Some(v.value().to_string())),
            None => Ok(None),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: String,
        value: u32,
    }

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn row(id: &str, value: u32) -> Row {
        Row {
            id: id.to_string(),
            value,
        }
    }

    #[test]
    fn put_and_get_round_trip() {
        let (db, _dir) = temp_db();
        db.put_json(USERS, "u1", &row("u1", 7)).unwrap();

        let loaded: Row = db.get_json(USERS, "u1").unwrap().unwrap();
        assert_eq!(loaded, row("u1", 7));

        let missing: Option<Row> = db.get_json(USERS, "u2").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn put_overwrites_existing_value() {
        let (db, _dir) = temp_db();
        db.put_json(WALLETS, "u1|BTC", &row("w", 1)).unwrap();
        db.put_json(WALLETS, "u1|BTC", &row("w", 2)).unwrap();

        let loaded: Row = db.get_json(WALLETS, "u1|BTC").unwrap().unwrap();
        assert_eq!(loaded.value, 2);
        assert_eq!(db.count(WALLETS).unwrap(), 1);
    }

    #[test]
    fn insert_if_absent_claims_exactly_once() {
        let (db, _dir) = temp_db();
        let first = db
            .insert_json_if_absent(WEBHOOK_EVENTS, "striga|evt-1", &row("e", 1))
            .unwrap();
        let second = db
            .insert_json_if_absent(WEBHOOK_EVENTS, "striga|evt-1", &row("e", 2))
            .unwrap();

        assert!(first);
        assert!(!second);

        // The first write wins
        let stored: Row = db.get_json(WEBHOOK_EVENTS, "striga|evt-1").unwrap().unwrap();
        assert_eq!(stored.value, 1);
    }

    #[test]
    fn insert_if_absent_is_race_free_across_threads() {
        let (db, _dir) = temp_db();
        let db = std::sync::Arc::new(db);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = std::sync::Arc::clone(&db);
                std::thread::spawn(move || {
                    db.insert_json_if_absent(WEBHOOK_EVENTS, "striga|evt-race", &row("e", i))
                        .unwrap()
                })
            })
            .collect();

        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|claimed| *claimed)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn scan_prefix_respects_boundaries() {
        let (db, _dir) = temp_db();
        db.put_json(WALLETS, "u1|BTC", &row("a", 1)).unwrap();
        db.put_json(WALLETS, "u1|ETH", &row("b", 2)).unwrap();
        db.put_json(WALLETS, "u10|BTC", &row("c", 3)).unwrap();
        db.put_json(WALLETS, "u2|BTC", &row("d", 4)).unwrap();

        let u1: Vec<Row> = db.scan_prefix_json(WALLETS, "u1|").unwrap();
        assert_eq!(u1.len(), 2);

        let all: Vec<Row> = db.scan_all_json(WALLETS).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn append_preserves_insertion_order() {
        let (db, _dir) = temp_db();
        for i in 0..3 {
            let seq = db.append_json(OFFER_HISTORY, "offer-1", &row("h", i)).unwrap();
            assert_eq!(seq, u64::from(i));
        }
        // Interleave another offer to check prefix isolation
        db.append_json(OFFER_HISTORY, "offer-2", &row("x", 99)).unwrap();

        let history: Vec<Row> = db.scan_prefix_json(OFFER_HISTORY, "offer-1|").unwrap();
        let values: Vec<u32> = history.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[test]
    fn provider_user_index_round_trip() {
        let (db, _dir) = temp_db();
        db.index_provider_user("striga-abc", "user-1").unwrap();

        assert_eq!(
            db.lookup_provider_user("striga-abc").unwrap(),
            Some("user-1".to_string())
        );
        assert_eq!(db.lookup_provider_user("unknown").unwrap(), None);
    }

    #[test]
    fn composite_key_joins_with_pipe() {
        assert_eq!(composite_key("u1", "BTC"), "u1|BTC");
    }
}
