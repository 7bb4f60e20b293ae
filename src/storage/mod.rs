// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! # Storage Module
//!
//! Persistence for the marketplace, backed by a single embedded redb
//! database plus an in-process response cache.
//!
//! ## Layout
//!
//! ```text
//! {DATA_DIR}/parcela.redb
//!   users / user_provider_index
//!   properties / documents
//!   offers / offer_history
//!   payments / wallets / ibans
//!   webhook_events          # idempotency ledger + audit trail
//!   notifications
//! ```
//!
//! Repositories own all reads and writes; handlers never touch redb tables
//! directly. The webhook event table is the correctness anchor for webhook
//! idempotency; see [`repository::webhook_events`].

pub mod cache;
pub mod database;
pub mod repository;

pub use cache::ResponseCache;
pub use database::{Database, StorageError, StorageResult};
pub use repository::{
    IbanRepository, KycStatus, ListingState, NotificationKind, NotificationRepository,
    OfferRepository, OfferState, PaymentRepository, PaymentStatus, PropertyRepository,
    StatusHistoryEntry, StoredDocument, StoredIban, StoredNotification, StoredOffer,
    StoredPayment, StoredProperty, StoredUser, StoredWallet, StoredWebhookEvent, UserRepository,
    UserRole, WalletRepository, WebhookEventRepository,
};
