// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Offer repository with the transaction state machine.
//!
//! An offer progresses through an ordered set of states, one step at a time.
//! Every applied transition appends exactly one row to the append-only status
//! history, recording the actor and timestamp. The transition table lives
//! here and is the only place allowed to change an offer's state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{Database, StorageError, StorageResult, OFFERS, OFFER_HISTORY};

/// Offer lifecycle state, ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferState {
    Offer,
    Negotiation,
    Agreement,
    Escrow,
    Closing,
    Completed,
}

impl OfferState {
    /// The next state in the ordered progression, if any.
    pub fn next(self) -> Option<OfferState> {
        use OfferState::*;
        match self {
            Offer => Some(Negotiation),
            Negotiation => Some(Agreement),
            Agreement => Some(Escrow),
            Escrow => Some(Closing),
            Closing => Some(Completed),
            Completed => None,
        }
    }

    /// Transitions move strictly forward, one step at a time.
    pub fn can_transition(self, to: OfferState) -> bool {
        self.next() == Some(to)
    }

    /// Whether the offer still occupies the property for its buyer.
    pub fn is_active(self) -> bool {
        self != OfferState::Completed
    }
}

/// Persisted offer (the marketplace transaction).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredOffer {
    /// Unique offer identifier (UUID).
    pub offer_id: String,
    pub property_id: String,
    pub buyer_user_id: String,
    pub seller_user_id: String,
    /// Current lifecycle state.
    pub state: OfferState,
    /// Offered price in EUR (decimal string).
    pub offer_price_eur: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms: Option<String>,
    pub proposal_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the append-only status history.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusHistoryEntry {
    pub offer_id: String,
    /// Absent for the initial entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_state: Option<OfferState>,
    pub to_state: OfferState,
    /// User who caused the transition.
    pub changed_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Repository for offers and their status history.
pub struct OfferRepository<'a> {
    db: &'a Database,
}

impl<'a> OfferRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Persist a new offer and its initial history row.
    pub fn create(&self, offer: &StoredOffer, actor: &str) -> StorageResult<()> {
        let inserted = self.db.insert_json_if_absent(OFFERS, &offer.offer_id, offer)?;
        if !inserted {
            return Err(StorageError::AlreadyExists(format!(
                "Offer {}",
                offer.offer_id
            )));
        }
        let entry = StatusHistoryEntry {
            offer_id: offer.offer_id.clone(),
            from_state: None,
            to_state: offer.state,
            changed_by: actor.to_string(),
            notes: Some("Initial offer created".to_string()),
            changed_at: Utc::now(),
        };
        self.db.append_json(OFFER_HISTORY, &offer.offer_id, &entry)?;
        Ok(())
    }

    /// Get an offer by id.
    pub fn get(&self, offer_id: &str) -> StorageResult<StoredOffer> {
        self.db
            .get_json(OFFERS, offer_id)?
            .ok_or_else(|| StorageError::NotFound(format!("Offer {offer_id}")))
    }

    /// Apply a transition, validated against the transition table, and append
    /// the history row.
    pub fn advance(
        &self,
        offer_id: &str,
        to: OfferState,
        actor: &str,
        notes: Option<&str>,
    ) -> StorageResult<StoredOffer> {
        let mut offer = self.get(offer_id)?;
        if !offer.state.can_transition(to) {
            return Err(StorageError::InvalidTransition(format!(
                "offer {offer_id}: {:?} → {:?}",
                offer.state, to
            )));
        }
        let from = offer.state;
        offer.state = to;
        offer.updated_at = Utc::now();
        self.db.put_json(OFFERS, offer_id, &offer)?;

        let entry = StatusHistoryEntry {
            offer_id: offer_id.to_string(),
            from_state: Some(from),
            to_state: to,
            changed_by: actor.to_string(),
            notes: notes.map(str::to_string),
            changed_at: Utc::now(),
        };
        self.db.append_json(OFFER_HISTORY, offer_id, &entry)?;
        Ok(offer)
    }

    /// Status history in insertion order.
    pub fn history(&self, offer_id: &str) -> StorageResult<Vec<StatusHistoryEntry>> {
        let prefix = format!("{offer_id}|");
        self.db.scan_prefix_json(OFFER_HISTORY, &prefix)
    }

    /// All offers, newest first.
    pub fn list_all(&self) -> StorageResult<Vec<StoredOffer>> {
        let mut offers: Vec<StoredOffer> = self.db.scan_all_json(OFFERS)?;
        offers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(offers)
    }

    /// Offers placed by a buyer, newest first.
    pub fn list_by_buyer(&self, buyer_user_id: &str) -> StorageResult<Vec<StoredOffer>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|o| o.buyer_user_id == buyer_user_id)
            .collect())
    }

    /// Offers on a seller's properties, newest first.
    pub fn list_by_seller(&self, seller_user_id: &str) -> StorageResult<Vec<StoredOffer>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|o| o.seller_user_id == seller_user_id)
            .collect())
    }

    /// Offers on one property.
    pub fn list_by_property(&self, property_id: &str) -> StorageResult<Vec<StoredOffer>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|o| o.property_id == property_id)
            .collect())
    }

    /// Whether the buyer already has an active offer on the property.
    pub fn has_active_offer(&self, property_id: &str, buyer_user_id: &str) -> StorageResult<bool> {
        Ok(self.list_by_property(property_id)?.iter().any(|o| {
            o.buyer_user_id == buyer_user_id && o.state.is_active()
        }))
    }

    /// Count all offers.
    pub fn count(&self) -> StorageResult<u64> {
        self.db.count(OFFERS)
    }
}
