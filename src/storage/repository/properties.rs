// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Property listing repository.
//!
//! A listing moves through a single tagged state machine from submission to
//! approval. Transitions are validated centrally here; nothing else in the
//! codebase mutates the listing state. Buyer-facing visibility derives from
//! the state alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{
    composite_key, Database, StorageError, StorageResult, DOCUMENTS, PROPERTIES,
};

/// Listing review state.
///
/// ```text
/// SUBMITTED → COMPLIANCE_REVIEW → INTERVIEW → FINAL_REVIEW → APPROVED
///     └──────────────┴──────────────┴──────────────┴───────→ REJECTED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingState {
    /// Seller submitted the listing; awaiting document checks.
    Submitted,
    /// Compliance is reviewing documents.
    ComplianceReview,
    /// Seller interview scheduled or in progress.
    Interview,
    /// Final approval decision pending.
    FinalReview,
    /// Listing is live and visible to buyers.
    Approved,
    /// Listing was rejected at some review stage.
    Rejected,
}

impl ListingState {
    /// The central transition table. Every listing-state mutation goes
    /// through [`PropertyRepository::advance_state`], which consults this.
    pub fn can_transition(self, to: ListingState) -> bool {
        use ListingState::*;
        matches!(
            (self, to),
            (Submitted, ComplianceReview)
                | (ComplianceReview, Interview)
                | (Interview, FinalReview)
                | (FinalReview, Approved)
                | (Submitted, Rejected)
                | (ComplianceReview, Rejected)
                | (Interview, Rejected)
                | (FinalReview, Rejected)
        )
    }

    /// Whether buyers can see and bid on the listing.
    pub fn is_visible(self) -> bool {
        self == ListingState::Approved
    }

    /// Whether the review is over.
    pub fn is_terminal(self) -> bool {
        matches!(self, ListingState::Approved | ListingState::Rejected)
    }
}

/// Persisted property listing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredProperty {
    /// Unique property identifier (UUID).
    pub property_id: String,
    /// Short human-facing code (e.g. `PRP-1A2B3C`).
    pub code: String,
    /// Seller who owns the listing.
    pub seller_user_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub address: String,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
    /// Asking price in EUR (decimal string).
    pub price_eur: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_sqm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<u32>,
    /// Current review state.
    pub listing_state: ListingState,
    /// Reviewer remarks accumulated across stages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Document attached to a property listing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredDocument {
    /// Unique document identifier (UUID).
    pub document_id: String,
    pub property_id: String,
    pub filename: String,
    pub file_size: u64,
    pub mime_type: String,
    /// Kind of document (deed, floor plan, energy certificate, ...).
    pub document_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Set by compliance once the document has been checked.
    pub verified: bool,
    pub uploaded_at: DateTime<Utc>,
}

/// Repository for property listings and their documents.
pub struct PropertyRepository<'a> {
    db: &'a Database,
}

impl<'a> PropertyRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Persist a new listing.
    pub fn create(&self, property: &StoredProperty) -> StorageResult<()> {
        let inserted =
            self.db
                .insert_json_if_absent(PROPERTIES, &property.property_id, property)?;
        if !inserted {
            return Err(StorageError::AlreadyExists(format!(
                "Property {}",
                property.property_id
            )));
        }
        Ok(())
    }

    /// Get a listing by id.
    pub fn get(&self, property_id: &str) -> StorageResult<StoredProperty> {
        self.db
            .get_json(PROPERTIES, property_id)?
            .ok_or_else(|| StorageError::NotFound(format!("Property {property_id}")))
    }

    /// Update an existing listing (state excluded; use [`Self::advance_state`]).
    pub fn update(&self, property: &StoredProperty) -> StorageResult<()> {
        if self
            .db
            .get_json::<StoredProperty>(PROPERTIES, &property.property_id)?
            .is_none()
        {
            return Err(StorageError::NotFound(format!(
                "Property {}",
                property.property_id
            )));
        }
        self.db.put_json(PROPERTIES, &property.property_id, property)
    }

    /// Apply a review transition, validated against the transition table.
    pub fn advance_state(
        &self,
        property_id: &str,
        to: ListingState,
        notes: Option<&str>,
    ) -> StorageResult<StoredProperty> {
        let mut property = self.get(property_id)?;
        if !property.listing_state.can_transition(to) {
            return Err(StorageError::InvalidTransition(format!(
                "listing {property_id}: {:?} → {:?}",
                property.listing_state, to
            )));
        }
        property.listing_state = to;
        if let Some(notes) = notes {
            property.compliance_notes = Some(notes.to_string());
        }
        property.updated_at = Utc::now();
        self.db.put_json(PROPERTIES, property_id, &property)?;
        Ok(property)
    }

    /// List every listing (admin view), newest first.
    pub fn list_all(&self) -> StorageResult<Vec<StoredProperty>> {
        let mut properties: Vec<StoredProperty> = self.db.scan_all_json(PROPERTIES)?;
        properties.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(properties)
    }

    /// List a seller's own listings, newest first.
    pub fn list_by_seller(&self, seller_user_id: &str) -> StorageResult<Vec<StoredProperty>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|p| p.seller_user_id == seller_user_id)
            .collect())
    }

    /// List buyer-visible (approved) listings, newest first.
    pub fn list_visible(&self) -> StorageResult<Vec<StoredProperty>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|p| p.listing_state.is_visible())
            .collect())
    }

    /// Attach a document to a listing.
    pub fn add_document(&self, document: &StoredDocument) -> StorageResult<()> {
        let key = composite_key(&document.property_id, &document.document_id);
        self.db.put_json(DOCUMENTS, &key, document)
    }

    /// List documents for a listing, newest first.
    pub fn list_documents(&self, property_id: &str) -> StorageResult<Vec<StoredDocument>> {
        let prefix = format!("{property_id}|");
        let mut documents: Vec<StoredDocument> = self.db.scan_prefix_json(DOCUMENTS, &prefix)?;
        documents.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(documents)
    }

    /// Count all listings.
    pub fn count(&self) -> StorageResult<u64> {
        self.db.count(PROPERTIES)
    }
}
