// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Property listing endpoints.
//!
//! Sellers create and document listings; buyers only ever see listings in
//! the APPROVED state. Review transitions are admin-only and live in
//! `api::admin`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{Auth, AuthenticatedUser, Role},
    error::ApiError,
    state::AppState,
    storage::{ListingState, PropertyRepository, StoredDocument, StoredProperty},
};

use super::amount::parse_amount_eur;

/// Request body for creating a property listing.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreatePropertyRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub address: String,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
    /// Asking price in EUR decimal string (e.g. "250000").
    pub price_eur: String,
    #[serde(default)]
    pub area_sqm: Option<u32>,
    #[serde(default)]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub bathrooms: Option<u32>,
}

/// Request body for attaching a document to a listing.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AddDocumentRequest {
    pub filename: String,
    pub file_size: u64,
    pub mime_type: String,
    /// Kind of document (deed, floor plan, energy certificate, ...).
    pub document_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// List response for properties.
#[derive(Debug, Serialize, ToSchema)]
pub struct PropertyListResponse {
    pub properties: Vec<StoredProperty>,
    pub total: usize,
}

/// List response for documents.
#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentListResponse {
    pub documents: Vec<StoredDocument>,
    pub total: usize,
}

/// Generate the short human-facing listing code.
fn listing_code(property_id: &Uuid) -> String {
    let simple = property_id.simple().to_string();
    format!("PRP-{}", simple[..6].to_ascii_uppercase())
}

/// Create a property listing (sellers only). New listings start in
/// SUBMITTED and are invisible to buyers until approved.
#[utoipa::path(
    post,
    path = "/v1/properties",
    tag = "Properties",
    request_body = CreatePropertyRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Listing created", body = StoredProperty),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Only sellers can list properties")
    )
)]
pub async fn create_property(
    Auth(auth): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreatePropertyRequest>,
) -> Result<(StatusCode, Json<StoredProperty>), ApiError> {
    if !auth.has_role(Role::Seller) {
        return Err(ApiError::forbidden("Only sellers can list properties"));
    }
    if request.title.trim().is_empty() {
        return Err(ApiError::bad_request("Title is required"));
    }
    let (price_eur, _) = parse_amount_eur(&request.price_eur)?;

    let property_id = Uuid::new_v4();
    let now = Utc::now();
    let property = StoredProperty {
        property_id: property_id.to_string(),
        code: listing_code(&property_id),
        seller_user_id: auth.user_id.clone(),
        title: request.title.trim().to_string(),
        description: request.description,
        address: request.address,
        city: request.city,
        state: request.state,
        postal_code: request.postal_code,
        country: request.country,
        price_eur,
        area_sqm: request.area_sqm,
        bedrooms: request.bedrooms,
        bathrooms: request.bathrooms,
        listing_state: ListingState::Submitted,
        compliance_notes: None,
        created_at: now,
        updated_at: now,
    };

    PropertyRepository::new(&state.db)
        .create(&property)
        .map_err(|e| ApiError::internal(format!("Failed to store listing: {e}")))?;

    state.cache.invalidate_owner(&auth.user_id);

    Ok((StatusCode::CREATED, Json(property)))
}

/// List properties visible to the caller: admins see everything, sellers
/// their own listings, buyers only approved ones.
#[utoipa::path(
    get,
    path = "/v1/properties",
    tag = "Properties",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Properties listed", body = PropertyListResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_properties(
    Auth(auth): Auth,
    State(state): State<AppState>,
) -> Result<Json<PropertyListResponse>, ApiError> {
    let repo = PropertyRepository::new(&state.db);
    let properties = match auth.role {
        Role::Admin => repo.list_all(),
        Role::Seller => repo.list_by_seller(&auth.user_id),
        Role::Buyer => repo.list_visible(),
    }
    .map_err(|e| ApiError::internal(format!("Failed to list properties: {e}")))?;

    Ok(Json(PropertyListResponse {
        total: properties.len(),
        properties,
    }))
}

fn can_view(property: &StoredProperty, user: &AuthenticatedUser) -> bool {
    user.is_admin()
        || property.seller_user_id == user.user_id
        || property.listing_state.is_visible()
}

/// Get one property.
#[utoipa::path(
    get,
    path = "/v1/properties/{property_id}",
    tag = "Properties",
    params(("property_id" = String, Path, description = "Property ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Property details", body = StoredProperty),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_property(
    Auth(auth): Auth,
    State(state): State<AppState>,
    Path(property_id): Path<String>,
) -> Result<Json<StoredProperty>, ApiError> {
    let property = PropertyRepository::new(&state.db)
        .get(&property_id)
        .map_err(|_| ApiError::not_found("Property not found"))?;

    // Unapproved listings are indistinguishable from absent ones to buyers
    if !can_view(&property, &auth) {
        return Err(ApiError::not_found("Property not found"));
    }

    Ok(Json(property))
}

/// Attach a document to a listing (owner only).
#[utoipa::path(
    post,
    path = "/v1/properties/{property_id}/documents",
    tag = "Properties",
    params(("property_id" = String, Path, description = "Property ID")),
    request_body = AddDocumentRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Document attached", body = StoredDocument),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Property not found")
    )
)]
pub async fn add_document(
    Auth(auth): Auth,
    State(state): State<AppState>,
    Path(property_id): Path<String>,
    Json(request): Json<AddDocumentRequest>,
) -> Result<(StatusCode, Json<StoredDocument>), ApiError> {
    let repo = PropertyRepository::new(&state.db);
    let property = repo
        .get(&property_id)
        .map_err(|_| ApiError::not_found("Property not found"))?;

    if property.seller_user_id != auth.user_id {
        return Err(ApiError::forbidden("Only the owner can attach documents"));
    }
    if request.filename.trim().is_empty() {
        return Err(ApiError::bad_request("Filename is required"));
    }

    let document = StoredDocument {
        document_id: Uuid::new_v4().to_string(),
        property_id: property.property_id,
        filename: request.filename,
        file_size: request.file_size,
        mime_type: request.mime_type,
        document_type: request.document_type,
        description: request.description,
        verified: false,
        uploaded_at: Utc::now(),
    };

    repo.add_document(&document)
        .map_err(|e| ApiError::internal(format!("Failed to store document: {e}")))?;

    Ok((StatusCode::CREATED, Json(document)))
}

/// List a property's documents (owner or admin only).
#[utoipa::path(
    get,
    path = "/v1/properties/{property_id}/documents",
    tag = "Properties",
    params(("property_id" = String, Path, description = "Property ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Documents listed", body = DocumentListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Property not found")
    )
)]
pub async fn list_documents(
    Auth(auth): Auth,
    State(state): State<AppState>,
    Path(property_id): Path<String>,
) -> Result<Json<DocumentListResponse>, ApiError> {
    let repo = PropertyRepository::new(&state.db);
    let property = repo
        .get(&property_id)
        .map_err(|_| ApiError::not_found("Property not found"))?;

    if property.seller_user_id != auth.user_id && !auth.is_admin() {
        return Err(ApiError::forbidden(
            "Only the owner can view property documents",
        ));
    }

    let documents = repo
        .list_documents(&property_id)
        .map_err(|e| ApiError::internal(format!("Failed to list documents: {e}")))?;

    Ok(Json(DocumentListResponse {
        total: documents.len(),
        documents,
    }))
}
