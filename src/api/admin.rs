// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Admin endpoints: listing review, webhook event inspection, system
//! overview.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::AdminOnly,
    error::ApiError,
    state::AppState,
    storage::{
        IbanRepository, ListingState, OfferRepository, PaymentRepository, PropertyRepository,
        StorageError, StoredProperty, StoredWebhookEvent, UserRepository, WalletRepository,
        WebhookEventRepository,
    },
};

/// Request body for a listing review transition.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReviewPropertyRequest {
    /// Target review state; must be legal from the current state.
    pub to_state: ListingState,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Query params for webhook event inspection.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct WebhookEventListQuery {
    /// Filter by processed flag.
    pub processed: Option<bool>,
    /// Maximum number of results (default: 50).
    pub limit: Option<usize>,
}

/// Webhook event list response.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookEventListResponse {
    pub events: Vec<StoredWebhookEvent>,
    pub total: usize,
}

/// System-wide entity counts.
#[derive(Debug, Serialize, ToSchema)]
pub struct SystemOverviewResponse {
    pub users: u64,
    pub properties: u64,
    pub offers: u64,
    pub wallets: u64,
    pub ibans: u64,
    pub payments: u64,
    pub webhook_events: u64,
    /// Events that never finished dispatch (deferred or failed).
    pub unprocessed_webhook_events: usize,
}

/// Apply a review transition to a listing.
#[utoipa::path(
    post,
    path = "/v1/admin/properties/{property_id}/review",
    tag = "Admin",
    params(("property_id" = String, Path, description = "Property ID")),
    request_body = ReviewPropertyRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Review transition applied", body = StoredProperty),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Property not found"),
        (status = 422, description = "Illegal transition")
    )
)]
pub async fn review_property(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Path(property_id): Path<String>,
    Json(request): Json<ReviewPropertyRequest>,
) -> Result<Json<StoredProperty>, ApiError> {
    let repo = PropertyRepository::new(&state.db);

    let property = repo
        .advance_state(&property_id, request.to_state, request.notes.as_deref())
        .map_err(|e| match e {
            StorageError::NotFound(_) => ApiError::not_found("Property not found"),
            StorageError::InvalidTransition(message) => ApiError::unprocessable(message),
            other => ApiError::internal(format!("Failed to apply review: {other}")),
        })?;

    tracing::info!(
        admin = %admin.user_id,
        property_id = %property.property_id,
        state = ?property.listing_state,
        "listing review applied"
    );

    // Seller dashboards show review state; drop their cached copy
    state.cache.invalidate_owner(&property.seller_user_id);

    Ok(Json(property))
}

/// Inspect the webhook event ledger.
#[utoipa::path(
    get,
    path = "/v1/admin/webhook-events",
    tag = "Admin",
    params(WebhookEventListQuery),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Webhook events", body = WebhookEventListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admins only")
    )
)]
pub async fn list_webhook_events(
    AdminOnly(_admin): AdminOnly,
    State(state): State<AppState>,
    Query(query): Query<WebhookEventListQuery>,
) -> Result<Json<WebhookEventListResponse>, ApiError> {
    let limit = query.limit.unwrap_or(50);

    let events: Vec<StoredWebhookEvent> = WebhookEventRepository::new(&state.db)
        .list_all()
        .map_err(|e| ApiError::internal(format!("Failed to list events: {e}")))?
        .into_iter()
        .filter(|e| match query.processed {
            Some(processed) => e.processed == processed,
            None => true,
        })
        .take(limit)
        .collect();

    Ok(Json(WebhookEventListResponse {
        total: events.len(),
        events,
    }))
}

/// System overview counts.
#[utoipa::path(
    get,
    path = "/v1/admin/overview",
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "System overview", body = SystemOverviewResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admins only")
    )
)]
pub async fn system_overview(
    AdminOnly(_admin): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<SystemOverviewResponse>, ApiError> {
    let internal = |e: StorageError| ApiError::internal(format!("Failed to build overview: {e}"));

    let events = WebhookEventRepository::new(&state.db);
    Ok(Json(SystemOverviewResponse {
        users: UserRepository::new(&state.db).count().map_err(internal)?,
        properties: PropertyRepository::new(&state.db).count().map_err(internal)?,
        offers: OfferRepository::new(&state.db).count().map_err(internal)?,
        wallets: WalletRepository::new(&state.db).count().map_err(internal)?,
        ibans: IbanRepository::new(&state.db).count().map_err(internal)?,
        payments: PaymentRepository::new(&state.db).count().map_err(internal)?,
        webhook_events: events.count().map_err(internal)?,
        unprocessed_webhook_events: events.count_unprocessed().map_err(internal)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthenticatedUser, Role};
    use crate::storage::{Database, StoredWebhookEvent};
    use chrono::Utc;
    use serde_json::json;

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (AppState::new(db), dir)
    }

    fn admin() -> AdminOnly {
        AdminOnly(AuthenticatedUser {
            user_id: "admin-1".to_string(),
            role: Role::Admin,
            session_id: None,
            issuer: "test".to_string(),
            expires_at: 0,
        })
    }

    fn add_property(state: &AppState, id: &str) {
        let now = Utc::now();
        PropertyRepository::new(&state.db)
            .create(&StoredProperty {
                property_id: id.to_string(),
                code: format!("PRP-{id}"),
                seller_user_id: "seller-1".to_string(),
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
                listing_state: ListingState::Submitted,
                compliance_notes: None,
                created_at: now,
                updated_at: now,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn review_applies_legal_transition_and_rejects_skip() {
        let (state, _dir) = test_state();
        add_property(&state, "p1");

        let reviewed = review_property(
            admin(),
            State(state.clone()),
            Path("p1".to_string()),
            Json(ReviewPropertyRequest {
                to_state: ListingState::ComplianceReview,
                notes: Some("docs complete".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(reviewed.0.listing_state, ListingState::ComplianceReview);

        let err = review_property(
            admin(),
            State(state),
            Path("p1".to_string()),
            Json(ReviewPropertyRequest {
                to_state: ListingState::Approved,
                notes: None,
            }),
        )
        .await
        .expect_err("skip must be rejected");
        assert_eq!(err.status, axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn webhook_events_filter_by_processed() {
        let (state, _dir) = test_state();
        let events = WebhookEventRepository::new(&state.db);

        let pending = StoredWebhookEvent::new_pending(
            "striga".to_string(),
            "evt-1".to_string(),
            "WALLET_CREATED".to_string(),
            json!({}),
        );
        events.claim(&pending).unwrap();

        let done = StoredWebhookEvent::new_pending(
            "striga".to_string(),
            "evt-2".to_string(),
            "WALLET_CREATED".to_string(),
            json!({}),
        );
        events.claim(&done).unwrap();
        events.mark_processed("striga", "evt-2").unwrap();

        let unprocessed = list_webhook_events(
            admin(),
            State(state.clone()),
            Query(WebhookEventListQuery {
                processed: Some(false),
                limit: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(unprocessed.0.total, 1);
        assert_eq!(unprocessed.0.events[0].event_id, "evt-1");

        let all = list_webhook_events(
            admin(),
            State(state),
            Query(WebhookEventListQuery {
                processed: None,
                limit: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(all.0.total, 2);
    }

    #[tokio::test]
    async fn overview_counts_entities() {
        let (state, _dir) = test_state();
        add_property(&state, "p1");

        let overview = system_overview(admin(), State(state)).await.unwrap();
        assert_eq!(overview.0.properties, 1);
        assert_eq!(overview.0.users, 0);
        assert_eq!(overview.0.unprocessed_webhook_events, 0);
    }
}
