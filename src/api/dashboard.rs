// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Dashboard aggregates for the polling frontend.
//!
//! Each dashboard performs several independent repository reads and joins
//! them in memory into one response, which is cached per user. The KYC
//! status is reconciled against the provider on cache misses, so a lost
//! webhook cannot wedge the dashboard in a stale state.

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::{
    auth::{Auth, Role},
    error::ApiError,
    state::AppState,
    storage::{
        cache::keys, KycStatus, NotificationRepository, OfferRepository, OfferState,
        PropertyRepository, UserRepository, WalletRepository,
    },
};

use super::kyc::reconcile_kyc_status;

/// Property summary row on the seller dashboard.
#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardProperty {
    pub property_id: String,
    pub code: String,
    pub title: String,
    pub city: String,
    pub price_eur: String,
    pub listing_state: crate::storage::ListingState,
    pub offer_count: usize,
}

/// Seller dashboard aggregate.
#[derive(Debug, Serialize, ToSchema)]
pub struct SellerDashboardResponse {
    pub kyc_status: KycStatus,
    pub listed_properties: usize,
    pub approved_properties: usize,
    pub total_offers: usize,
    pub active_offers: usize,
    pub completed_sales: usize,
    pub has_wallets: bool,
    pub unread_notifications: usize,
    /// Five most recent listings.
    pub properties: Vec<DashboardProperty>,
}

/// Buyer dashboard aggregate.
#[derive(Debug, Serialize, ToSchema)]
pub struct BuyerDashboardResponse {
    pub kyc_status: KycStatus,
    pub wallet_count: usize,
    pub available_properties: usize,
    pub total_offers: usize,
    pub active_offers: usize,
    pub completed_purchases: usize,
    pub unread_notifications: usize,
}

/// Seller dashboard aggregate (cached per user).
#[utoipa::path(
    get,
    path = "/v1/dashboard/seller",
    tag = "Dashboard",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Seller dashboard", body = SellerDashboardResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Sellers only"),
        (status = 404, description = "User not registered")
    )
)]
pub async fn seller_dashboard(
    Auth(auth): Auth,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    if !auth.has_role(Role::Seller) {
        return Err(ApiError::forbidden("Sellers only"));
    }

    let cache_key = keys::seller_dashboard(&auth.user_id);
    if let Some(cached) = state.cache.get(&cache_key) {
        return Ok(Json(cached));
    }

    let users = UserRepository::new(&state.db);
    let user = users
        .get(&auth.user_id)
        .map_err(|_| ApiError::not_found("User not registered"))?;
    let user = reconcile_kyc_status(&state, user).await;

    // Independent reads, joined in memory
    let properties = PropertyRepository::new(&state.db)
        .list_by_seller(&auth.user_id)
        .map_err(|e| ApiError::internal(format!("Failed to load properties: {e}")))?;
    let offers = OfferRepository::new(&state.db)
        .list_by_seller(&auth.user_id)
        .map_err(|e| ApiError::internal(format!("Failed to load offers: {e}")))?;
    let unread_notifications = NotificationRepository::new(&state.db)
        .unread_count(&auth.user_id)
        .map_err(|e| ApiError::internal(format!("Failed to count notifications: {e}")))?;

    let has_wallets = if user.kyc_status == KycStatus::Passed {
        WalletRepository::new(&state.db)
            .count_by_user(&auth.user_id)
            .map_err(|e| ApiError::internal(format!("Failed to count wallets: {e}")))?
            > 0
    } else {
        false
    };

    let recent: Vec<DashboardProperty> = properties
        .iter()
        .take(5)
        .map(|p| DashboardProperty {
            property_id: p.property_id.clone(),
            code: p.code.clone(),
            title: p.title.clone(),
            city: p.city.clone(),
            price_eur: p.price_eur.clone(),
            listing_state: p.listing_state,
            offer_count: offers
                .iter()
                .filter(|o| o.property_id == p.property_id)
                .count(),
        })
        .collect();

    let response = SellerDashboardResponse {
        kyc_status: user.kyc_status,
        listed_properties: properties.len(),
        approved_properties: properties
            .iter()
            .filter(|p| p.listing_state.is_visible())
            .count(),
        total_offers: offers.len(),
        active_offers: offers.iter().filter(|o| o.state.is_active()).count(),
        completed_sales: offers
            .iter()
            .filter(|o| o.state == OfferState::Completed)
            .count(),
        has_wallets,
        unread_notifications,
        properties: recent,
    };

    let value = serde_json::to_value(&response)
        .map_err(|e| ApiError::internal(format!("Failed to render dashboard: {e}")))?;
    state.cache.put(&auth.user_id, &cache_key, value.clone());

    Ok(Json(value))
}

/// Buyer dashboard aggregate (cached per user).
#[utoipa::path(
    get,
    path = "/v1/dashboard/buyer",
    tag = "Dashboard",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Buyer dashboard", body = BuyerDashboardResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Buyers only"),
        (status = 404, description = "User not registered")
    )
)]
pub async fn buyer_dashboard(
    Auth(auth): Auth,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    if !auth.has_role(Role::Buyer) {
        return Err(ApiError::forbidden("Buyers only"));
    }

    let cache_key = keys::buyer_dashboard(&auth.user_id);
    if let Some(cached) = state.cache.get(&cache_key) {
        return Ok(Json(cached));
    }

    let users = UserRepository::new(&state.db);
    let user = users
        .get(&auth.user_id)
        .map_err(|_| ApiError::not_found("User not registered"))?;
    let user = reconcile_kyc_status(&state, user).await;

    let wallet_count = WalletRepository::new(&state.db)
        .count_by_user(&auth.user_id)
        .map_err(|e| ApiError::internal(format!("Failed to count wallets: {e}")))?;
    let available_properties = PropertyRepository::new(&state.db)
        .list_visible()
        .map_err(|e| ApiError::internal(format!("Failed to load properties: {e}")))?
        .len();
    let offers = OfferRepository::new(&state.db)
        .list_by_buyer(&auth.user_id)
        .map_err(|e| ApiError::internal(format!("Failed to load offers: {e}")))?;
    let unread_notifications = NotificationRepository::new(&state.db)
        .unread_count(&auth.user_id)
        .map_err(|e| ApiError::internal(format!("Failed to count notifications: {e}")))?;

    let response = BuyerDashboardResponse {
        kyc_status: user.kyc_status,
        wallet_count,
        available_properties,
        total_offers: offers.len(),
        active_offers: offers.iter().filter(|o| o.state.is_active()).count(),
        completed_purchases: offers
            .iter()
            .filter(|o| o.state == OfferState::Completed)
            .count(),
        unread_notifications,
    };

    let value = serde_json::to_value(&response)
        .map_err(|e| ApiError::internal(format!("Failed to render dashboard: {e}")))?;
    state.cache.put(&auth.user_id, &cache_key, value.clone());

    Ok(Json(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthenticatedUser;
    use crate::storage::{Database, ListingState, StoredProperty, StoredUser, UserRole};
    use chrono::Utc;

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

    fn register(state: &AppState, user_id: &str, role: UserRole) {
        UserRepository::new(&state.db)
            .create(&StoredUser::new(
                user_id.to_string(),
                format!("{user_id}@example.com"),
                "Ana".to_string(),
                "Costa".to_string(),
                role,
            ))
            .unwrap();
    }

    fn add_property(state: &AppState, id: &str, seller: &str, listing_state: ListingState) {
        let now = Utc::now();
        PropertyRepository::new(&state.db)
            .create(&StoredProperty {
                property_id: id.to_string(),
                code: format!("PRP-{id}"),
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
                listing_state,
                compliance_notes: None,
                created_at: now,
                updated_at: now,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn seller_dashboard_aggregates_counts() {
        let (state, _dir) = test_state();
        register(&state, "seller-1", UserRole::Seller);
        add_property(&state, "p1", "seller-1", ListingState::Submitted);
        add_property(&state, "p2", "seller-1", ListingState::Approved);

        let response = seller_dashboard(auth("seller-1", Role::Seller), State(state))
            .await
            .unwrap();

        assert_eq!(response.0["listed_properties"], 2);
        assert_eq!(response.0["approved_properties"], 1);
        assert_eq!(response.0["kyc_status"], "NOT_STARTED");
        assert_eq!(response.0["has_wallets"], false);
        assert_eq!(response.0["properties"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn seller_dashboard_is_cached_per_user() {
        let (state, _dir) = test_state();
        register(&state, "seller-1", UserRole::Seller);

        let first = seller_dashboard(auth("seller-1", Role::Seller), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(first.0["listed_properties"], 0);

        // New data is masked until invalidation
        add_property(&state, "p1", "seller-1", ListingState::Submitted);
        let cached = seller_dashboard(auth("seller-1", Role::Seller), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(cached.0["listed_properties"], 0);

        state.cache.invalidate_owner("seller-1");
        let fresh = seller_dashboard(auth("seller-1", Role::Seller), State(state))
            .await
            .unwrap();
        assert_eq!(fresh.0["listed_properties"], 1);
    }

    #[tokio::test]
    async fn dashboards_enforce_roles() {
        let (state, _dir) = test_state();

        let err = seller_dashboard(auth("buyer-1", Role::Buyer), State(state.clone()))
            .await
            .expect_err("buyer on seller dashboard");
        assert_eq!(err.status, axum::http::StatusCode::FORBIDDEN);

        let err = buyer_dashboard(auth("seller-1", Role::Seller), State(state))
            .await
            .expect_err("seller on buyer dashboard");
        assert_eq!(err.status, axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn buyer_dashboard_counts_visible_properties() {
        let (state, _dir) = test_state();
        register(&state, "buyer-1", UserRole::Buyer);
        add_property(&state, "p1", "seller-1", ListingState::Approved);
        add_property(&state, "p2", "seller-1", ListingState::Submitted);

        let response = buyer_dashboard(auth("buyer-1", Role::Buyer), State(state))
            .await
            .unwrap();
        assert_eq!(response.0["available_properties"], 1);
        assert_eq!(response.0["wallet_count"], 0);
        assert_eq!(response.0["total_offers"], 0);
    }
}
