// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Per-entity repositories over the embedded database.

pub mod ibans;
pub mod notifications;
pub mod offers;
pub mod payments;
pub mod properties;
pub mod users;
pub mod wallets;
pub mod webhook_events;

pub use ibans::{IbanRepository, StoredIban};
pub use notifications::{NotificationKind, NotificationRepository, StoredNotification};
pub use offers::{OfferRepository, OfferState, StatusHistoryEntry, StoredOffer};
pub use payments::{PaymentRepository, PaymentStatus, StoredPayment};
pub use properties::{ListingState, PropertyRepository, StoredDocument, StoredProperty};
pub use users::{KycStatus, StoredUser, UserRepository, UserRole};
pub use wallets::{StoredWallet, WalletRepository};
pub use webhook_events::{StoredWebhookEvent, WebhookEventRepository};
