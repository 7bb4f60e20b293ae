// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Offer endpoints: creation, validated state transitions, history.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{Auth, AuthenticatedUser, Role},
    error::ApiError,
    state::AppState,
    storage::{
        KycStatus, NotificationKind, NotificationRepository, OfferRepository, OfferState,
        PropertyRepository, StatusHistoryEntry, StorageError, StoredNotification, StoredOffer,
        UserRepository,
    },
};

use super::amount::parse_amount_eur;

/// Request body for creating an offer.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateOfferRequest {
    pub property_id: String,
    /// Offered price in EUR decimal string.
    pub offer_price_eur: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub terms: Option<String>,
}

/// Request body for advancing an offer's state.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AdvanceOfferRequest {
    pub to_state: OfferState,
    #[serde(default)]
    pub notes: Option<String>,
}

/// List response for offers.
#[derive(Debug, Serialize, ToSchema)]
pub struct OfferListResponse {
    pub offers: Vec<StoredOffer>,
    pub total: usize,
}

/// Status history response.
#[derive(Debug, Serialize, ToSchema)]
pub struct OfferHistoryResponse {
    pub history: Vec<StatusHistoryEntry>,
}

/// Create an offer on an approved property (buyers only, KYC required).
#[utoipa::path(
    post,
    path = "/v1/offers",
    tag = "Offers",
    request_body = CreateOfferRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Offer created", body = StoredOffer),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Only buyers can make offers"),
        (status = 404, description = "Property or user not found"),
        (status = 409, description = "Active offer already exists")
    )
)]
pub async fn create_offer(
    Auth(auth): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreateOfferRequest>,
) -> Result<(StatusCode, Json<StoredOffer>), ApiError> {
    let users = UserRepository::new(&state.db);
    let user = users
        .get(&auth.user_id)
        .map_err(|_| ApiError::not_found("User not found"))?;

    if !auth.has_role(Role::Buyer) {
        return Err(ApiError::forbidden(
            "Only buyers can make offers on properties",
        ));
    }
    if user.kyc_status != KycStatus::Passed {
        return Err(ApiError::bad_request(
            "KYC verification required to make offers",
        ));
    }

    let (offer_price_eur, _) = parse_amount_eur(&request.offer_price_eur)?;

    let properties = PropertyRepository::new(&state.db);
    let property = properties
        .get(&request.property_id)
        .map_err(|_| ApiError::not_found("Property not found"))?;

    if !property.listing_state.is_visible() {
        return Err(ApiError::bad_request(
            "Can only make offers on approved properties",
        ));
    }
    if property.seller_user_id == auth.user_id {
        return Err(ApiError::bad_request(
            "Cannot make an offer on your own property",
        ));
    }

    let offers = OfferRepository::new(&state.db);
    let has_active = offers
        .has_active_offer(&property.property_id, &auth.user_id)
        .map_err(|e| ApiError::internal(format!("Failed to check existing offers: {e}")))?;
    if has_active {
        return Err(ApiError::conflict(
            "You already have an active offer on this property",
        ));
    }

    let now = Utc::now();
    let offer = StoredOffer {
        offer_id: Uuid::new_v4().to_string(),
        property_id: property.property_id.clone(),
        buyer_user_id: auth.user_id.clone(),
        seller_user_id: property.seller_user_id.clone(),
        state: OfferState::Offer,
        offer_price_eur: offer_price_eur.clone(),
        message: request.message,
        terms: request.terms,
        proposal_date: now,
        created_at: now,
        updated_at: now,
    };

    offers
        .create(&offer, &auth.user_id)
        .map_err(|e| ApiError::internal(format!("Failed to store offer: {e}")))?;

    // Notification failure must not fail the offer
    let notification = StoredNotification::new(
        Uuid::new_v4().to_string(),
        property.seller_user_id.clone(),
        "New Offer Received".to_string(),
        format!(
            "{} made an offer of EUR {} on {}",
            user.full_name(),
            offer_price_eur,
            property.title
        ),
        NotificationKind::NewOffer,
    );
    if let Err(e) = NotificationRepository::new(&state.db).upsert(&notification) {
        warn!(offer_id = %offer.offer_id, error = %e, "failed to notify seller of new offer");
    }

    state.cache.invalidate_owner(&auth.user_id);
    state.cache.invalidate_owner(&property.seller_user_id);

    Ok((StatusCode::CREATED, Json(offer)))
}

fn is_participant(offer: &StoredOffer, user: &AuthenticatedUser) -> bool {
    user.is_admin()
        || offer.buyer_user_id == user.user_id
        || offer.seller_user_id == user.user_id
}

/// List offers visible to the caller.
#[utoipa::path(
    get,
    path = "/v1/offers",
    tag = "Offers",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Offers listed", body = OfferListResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_offers(
    Auth(auth): Auth,
    State(state): State<AppState>,
) -> Result<Json<OfferListResponse>, ApiError> {
    let offers = OfferRepository::new(&state.db);
    let listed = match auth.role {
        Role::Admin => offers.list_all(),
        Role::Seller => offers.list_by_seller(&auth.user_id),
        Role::Buyer => offers.list_by_buyer(&auth.user_id),
    }
    .map_err(|e| ApiError::internal(format!("Failed to list offers: {e}")))?;

    Ok(Json(OfferListResponse {
        total: listed.len(),
        offers: listed,
    }))
}

/// Get one offer (participants only).
#[utoipa::path(
    get,
    path = "/v1/offers/{offer_id}",
    tag = "Offers",
    params(("offer_id" = String, Path, description = "Offer ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Offer details", body = StoredOffer),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_offer(
    Auth(auth): Auth,
    State(state): State<AppState>,
    Path(offer_id): Path<String>,
) -> Result<Json<StoredOffer>, ApiError> {
    let offer = OfferRepository::new(&state.db)
        .get(&offer_id)
        .map_err(|_| ApiError::not_found("Offer not found"))?;

    if !is_participant(&offer, &auth) {
        return Err(ApiError::forbidden(
            "You are not a participant in this offer",
        ));
    }

    Ok(Json(offer))
}

/// Advance an offer to the next state. The transition table rejects
/// anything except the single next state in the progression.
#[utoipa::path(
    post,
    path = "/v1/offers/{offer_id}/advance",
    tag = "Offers",
    params(("offer_id" = String, Path, description = "Offer ID")),
    request_body = AdvanceOfferRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Offer advanced", body = StoredOffer),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found"),
        (status = 422, description = "Illegal transition")
    )
)]
pub async fn advance_offer(
    Auth(auth): Auth,
    State(state): State<AppState>,
    Path(offer_id): Path<String>,
    Json(request): Json<AdvanceOfferRequest>,
) -> Result<Json<StoredOffer>, ApiError> {
    let offers = OfferRepository::new(&state.db);
    let offer = offers
        .get(&offer_id)
        .map_err(|_| ApiError::not_found("Offer not found"))?;

    if !is_participant(&offer, &auth) {
        return Err(ApiError::forbidden(
            "You are not a participant in this offer",
        ));
    }

    let updated = offers
        .advance(&offer_id, request.to_state, &auth.user_id, request.notes.as_deref())
        .map_err(|e| match e {
            StorageError::InvalidTransition(message) => ApiError::unprocessable(message),
            other => ApiError::internal(format!("Failed to advance offer: {other}")),
        })?;

    // Tell the counterparty; log-only on failure
    let counterparty = if auth.user_id == updated.buyer_user_id {
        updated.seller_user_id.clone()
    } else {
        updated.buyer_user_id.clone()
    };
    let notification = StoredNotification::new(
        Uuid::new_v4().to_string(),
        counterparty.clone(),
        "Offer Status Update".to_string(),
        format!("Offer {} moved to {:?}", updated.offer_id, updated.state),
        NotificationKind::OfferUpdate,
    );
    if let Err(e) = NotificationRepository::new(&state.db).upsert(&notification) {
        warn!(offer_id = %updated.offer_id, error = %e, "failed to notify counterparty");
    }

    state.cache.invalidate_owner(&updated.buyer_user_id);
    state.cache.invalidate_owner(&updated.seller_user_id);

    Ok(Json(updated))
}

/// Status history for an offer (participants only).
#[utoipa::path(
    get,
    path = "/v1/offers/{offer_id}/history",
    tag = "Offers",
    params(("offer_id" = String, Path, description = "Offer ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Status history", body = OfferHistoryResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    )
)]
pub async fn offer_history(
    Auth(auth): Auth,
    State(state): State<AppState>,
    Path(offer_id): Path<String>,
) -> Result<Json<OfferHistoryResponse>, ApiError> {
    let offers = OfferRepository::new(&state.db);
    let offer = offers
        .get(&offer_id)
        .map_err(|_| ApiError::not_found("Offer not found"))?;

    if !is_participant(&offer, &auth) {
        return Err(ApiError::forbidden(
            "You are not a participant in this offer",
        ));
    }

    let history = offers
        .history(&offer_id)
        .map_err(|e| ApiError::internal(format!("Failed to load history: {e}")))?;

    Ok(Json(OfferHistoryResponse { history }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, ListingState, StoredProperty, StoredUser, UserRole};

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (AppState::new(db), dir)
    }

    fn auth(user_id: &str, role: Role) -> Auth {
        Auth(AuthenticatedUser {
            user_id: user_id.to_string(),
            role,
            session_id: None,
            issuer: "test".to_string(),
            expires_at: 0,
        })
    }

    fn register_buyer(state: &AppState, user_id: &str, kyc: KycStatus) {
        let users = UserRepository::new(&state.db);
        users
            .create(&StoredUser::new(
                user_id.to_string(),
                format!("{user_id}@example.com"),
                "Rui".to_string(),
                "Pereira".to_string(),
                UserRole::Buyer,
            ))
            .unwrap();
        if kyc != KycStatus::NotStarted {
            users.set_kyc_status(user_id, kyc, None).unwrap();
        }
    }

    fn approved_property(state: &AppState, property_id: &str, seller: &str) {
        let now = Utc::now();
        PropertyRepository::new(&state.db)
            .create(&StoredProperty {
                property_id: property_id.to_string(),
                code: format!("PRP-{property_id}"),
                seller_user_id: seller.to_string(),
                title: "T2 apartment".to_string(),
                description: None,
                address: "Rua das Flores 1".to_string(),
                city: "Lisboa".to_string(),
                state: None,
                postal_code: "1100-000".to_string(),
                country: "PT".to_string(),
                price_eur: "250000.00".to_string(),
                area_sqm: None,
                bedrooms: None,
                bathrooms: None,
                listing_state: ListingState::Approved,
                compliance_notes: None,
                created_at: now,
                updated_at: now,
            })
            .unwrap();
    }

    fn offer_request(property_id: &str) -> CreateOfferRequest {
        CreateOfferRequest {
            property_id: property_id.to_string(),
            offer_price_eur: "240000".to_string(),
            message: Some("Ready to move fast".to_string()),
            terms: None,
        }
    }

    async fn create(
        state: &AppState,
        buyer: &str,
        property_id: &str,
    ) -> Result<StoredOffer, ApiError> {
        create_offer(
            auth(buyer, Role::Buyer),
            State(state.clone()),
            Json(offer_request(property_id)),
        )
        .await
        .map(|(_, response)| response.0)
    }

    #[tokio::test]
    async fn create_offer_happy_path_notifies_seller() {
        let (state, _dir) = test_state();
        register_buyer(&state, "buyer-1", KycStatus::Passed);
        approved_property(&state, "p1", "seller-1");

        let offer = create(&state, "buyer-1", "p1").await.unwrap();
        assert_eq!(offer.state, OfferState::Offer);
        assert_eq!(offer.offer_price_eur, "240000.00");
        assert_eq!(offer.seller_user_id, "seller-1");

        // Initial history row exists
        let history = OfferRepository::new(&state.db).history(&offer.offer_id).unwrap();
        assert_eq!(history.len(), 1);

        // Seller got exactly one notification
        let notifications = NotificationRepository::new(&state.db)
            .list_by_user("seller-1")
            .unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::NewOffer);
    }

    #[tokio::test]
    async fn create_offer_requires_passed_kyc() {
        let (state, _dir) = test_state();
        register_buyer(&state, "buyer-1", KycStatus::Initiated);
        approved_property(&state, "p1", "seller-1");

        let err = create(&state, "buyer-1", "p1").await.expect_err("must fail");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_offer_rejects_self_offers() {
        let (state, _dir) = test_state();
        register_buyer(&state, "seller-1", KycStatus::Passed);
        approved_property(&state, "p1", "seller-1");

        let err = create(&state, "seller-1", "p1").await.expect_err("must fail");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_offer_rejects_unapproved_property() {
        let (state, _dir) = test_state();
        register_buyer(&state, "buyer-1", KycStatus::Passed);
        approved_property(&state, "p1", "seller-1");
        // Force the listing back to an unapproved state directly in storage
        let repo = PropertyRepository::new(&state.db);
        let mut property = repo.get("p1").unwrap();
        property.listing_state = ListingState::ComplianceReview;
        repo.update(&property).unwrap();

        let err = create(&state, "buyer-1", "p1").await.expect_err("must fail");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn second_active_offer_conflicts() {
        let (state, _dir) = test_state();
        register_buyer(&state, "buyer-1", KycStatus::Passed);
        approved_property(&state, "p1", "seller-1");

        create(&state, "buyer-1", "p1").await.unwrap();
        let err = create(&state, "buyer-1", "p1").await.expect_err("must conflict");
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn advance_validates_transition_and_participant() {
        let (state, _dir) = test_state();
        register_buyer(&state, "buyer-1", KycStatus::Passed);
        approved_property(&state, "p1", "seller-1");
        let offer = create(&state, "buyer-1", "p1").await.unwrap();

        // A stranger cannot advance
        let err = advance_offer(
            auth("stranger", Role::Buyer),
            State(state.clone()),
            Path(offer.offer_id.clone()),
            Json(AdvanceOfferRequest {
                to_state: OfferState::Negotiation,
                notes: None,
            }),
        )
        .await
        .expect_err("stranger must be rejected");
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        // Skipping a state is unprocessable
        let err = advance_offer(
            auth("seller-1", Role::Seller),
            State(state.clone()),
            Path(offer.offer_id.clone()),
            Json(AdvanceOfferRequest {
                to_state: OfferState::Escrow,
                notes: None,
            }),
        )
        .await
        .expect_err("skip must be rejected");
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);

        // The legal next state succeeds and notifies the buyer
        let updated = advance_offer(
            auth("seller-1", Role::Seller),
            State(state.clone()),
            Path(offer.offer_id.clone()),
            Json(AdvanceOfferRequest {
                to_state: OfferState::Negotiation,
                notes: Some("countered".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.0.state, OfferState::Negotiation);

        let notifications = NotificationRepository::new(&state.db)
            .list_by_user("buyer-1")
            .unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::OfferUpdate);
    }

    #[tokio::test]
    async fn listing_is_role_scoped() {
        let (state, _dir) = test_state();
        register_buyer(&state, "buyer-1", KycStatus::Passed);
        approved_property(&state, "p1", "seller-1");
        create(&state, "buyer-1", "p1").await.unwrap();

        let as_buyer = list_offers(auth("buyer-1", Role::Buyer), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(as_buyer.0.total, 1);

        let as_seller = list_offers(auth("seller-1", Role::Seller), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(as_seller.0.total, 1);

        let as_other_buyer = list_offers(auth("buyer-2", Role::Buyer), State(state))
            .await
            .unwrap();
        assert_eq!(as_other_buyer.0.total, 0);
    }
}
