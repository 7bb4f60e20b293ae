// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Wallet repository.
//!
//! Wallets are keyed by (user, currency) and written exclusively through
//! upserts: WALLET_CREATED webhooks may be redelivered, and redelivery must
//! not create a second wallet row. The balance is a local mirror and never
//! authoritative; the provider holds custody.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{composite_key, Database, StorageResult, WALLETS};

/// Persisted wallet mirror.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredWallet {
    pub user_id: String,
    /// Currency code (e.g. "BTC").
    pub currency: String,
    /// Provider-assigned wallet id, once confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_wallet_id: Option<String>,
    /// On-chain deposit address, once confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Locally cached balance (decimal string). Not authoritative.
    pub balance: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Repository for wallet mirrors.
pub struct WalletRepository<'a> {
    db: &'a Database,
}

impl<'a> WalletRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Get a wallet by (user, currency).
    pub fn get(&self, user_id: &str, currency: &str) -> StorageResult<Option<StoredWallet>> {
        self.db.get_json(WALLETS, &composite_key(user_id, currency))
    }

    /// Create or update the wallet confirmed by the provider.
    ///
    /// Idempotent: applying the same event twice leaves one row with the same
    /// provider id and address.
    pub fn upsert_from_provider(
        &self,
        user_id: &str,
        currency: &str,
        provider_wallet_id: &str,
        address: Option<&str>,
    ) -> StorageResult<StoredWallet> {
        let now = Utc::now();
        let wallet = match self.get(user_id, currency)? {
            Some(mut existing) => {
                existing.provider_wallet_id = Some(provider_wallet_id.to_string());
                if let Some(address) = address {
                    existing.address = Some(address.to_string());
                }
                existing.last_sync_at = Some(now);
                existing
            }
            None => StoredWallet {
                user_id: user_id.to_string(),
                currency: currency.to_string(),
                provider_wallet_id: Some(provider_wallet_id.to_string()),
                address: address.map(str::to_string),
                balance: "0".to_string(),
                last_sync_at: Some(now),
                created_at: now,
            },
        };
        self.db
            .put_json(WALLETS, &composite_key(user_id, currency), &wallet)?;
        Ok(wallet)
    }

    /// List a user's wallets in currency order.
    pub fn list_by_user(&self, user_id: &str) -> StorageResult<Vec<StoredWallet>> {
        let prefix = format!("{user_id}|");
        self.db.scan_prefix_json(WALLETS, &prefix)
    }

    /// Count a user's wallets.
    pub fn count_by_user(&self, user_id: &str) -> StorageResult<usize> {
        Ok(self.list_by_user(user_id)?.len())
    }

    /// Count all wallets.
    pub fn count(&self) -> StorageResult<u64> {
        self.db.count(WALLETS)
    }
}
