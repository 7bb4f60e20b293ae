// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;

pub mod admin;
pub(crate) mod amount;
pub mod dashboard;
pub mod health;
pub mod kyc;
pub mod notifications;
pub mod offers;
pub mod properties;
pub mod users;
pub mod wallets;
pub mod webhooks;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/webhooks/striga", post(webhooks::receive_striga_webhook))
        .route("/users/register", post(users::register_user))
        .route("/users/me", get(users::get_current_user))
        .route("/kyc/start", post(kyc::start_kyc))
        .route("/kyc/status", get(kyc::kyc_status))
        .route(
            "/properties",
            get(properties::list_properties).post(properties::create_property),
        )
        .route("/properties/{property_id}", get(properties::get_property))
        .route(
            "/properties/{property_id}/documents",
            get(properties::list_documents).post(properties::add_document),
        )
        .route("/offers", get(offers::list_offers).post(offers::create_offer))
        .route("/offers/{offer_id}", get(offers::get_offer))
        .route("/offers/{offer_id}/advance", post(offers::advance_offer))
        .route("/offers/{offer_id}/history", get(offers::offer_history))
        .route(
            "/wallets",
            get(wallets::list_wallets).post(wallets::create_wallet),
        )
        .route("/ibans", get(wallets::list_ibans))
        .route("/notifications", get(notifications::list_notifications))
        .route(
            "/notifications/count",
            get(notifications::notification_count),
        )
        .route(
            "/notifications/{notification_id}/read",
            post(notifications::mark_notification_read),
        )
        .route("/dashboard/seller", get(dashboard::seller_dashboard))
        .route("/dashboard/buyer", get(dashboard::buyer_dashboard))
        .route(
            "/admin/properties/{property_id}/review",
            post(admin::review_property),
        )
        .route("/admin/webhook-events", get(admin::list_webhook_events))
        .route("/admin/overview", get(admin::system_overview))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        webhooks::receive_striga_webhook,
        users::register_user,
        users::get_current_user,
        kyc::start_kyc,
        kyc::kyc_status,
        properties::create_property,
        properties::list_properties,
        properties::get_property,
        properties::add_document,
        properties::list_documents,
        offers::create_offer,
        offers::list_offers,
        offers::get_offer,
        offers::advance_offer,
        offers::offer_history,
        wallets::list_wallets,
        wallets::create_wallet,
        wallets::list_ibans,
        notifications::list_notifications,
        notifications::notification_count,
        notifications::mark_notification_read,
        dashboard::seller_dashboard,
        dashboard::buyer_dashboard,
        admin::review_property,
        admin::list_webhook_events,
        admin::system_overview,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            webhooks::WebhookAck,
            users::RegisterRequest,
            users::UserResponse,
            users::UserMeResponse,
            kyc::KycStartResponse,
            kyc::KycStatusResponse,
            properties::CreatePropertyRequest,
            properties::AddDocumentRequest,
            properties::PropertyListResponse,
            properties::DocumentListResponse,
            offers::CreateOfferRequest,
            offers::AdvanceOfferRequest,
            offers::OfferListResponse,
            offers::OfferHistoryResponse,
            wallets::CreateWalletRequest,
            wallets::WalletRequestedResponse,
            wallets::WalletListResponse,
            wallets::IbanListResponse,
            notifications::NotificationListResponse,
            notifications::NotificationCountResponse,
            dashboard::SellerDashboardResponse,
            dashboard::BuyerDashboardResponse,
            dashboard::DashboardProperty,
            admin::ReviewPropertyRequest,
            admin::WebhookEventListResponse,
            admin::SystemOverviewResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            crate::auth::Role,
            crate::storage::KycStatus,
            crate::storage::UserRole,
            crate::storage::ListingState,
            crate::storage::OfferState,
            crate::storage::NotificationKind,
            crate::storage::StoredProperty,
            crate::storage::StoredDocument,
            crate::storage::StoredOffer,
            crate::storage::StatusHistoryEntry,
            crate::storage::StoredWallet,
            crate::storage::StoredIban,
            crate::storage::StoredNotification,
            crate::storage::StoredWebhookEvent
        )
    ),
    tags(
        (name = "Webhooks", description = "Provider webhook ingestion"),
        (name = "Users", description = "Registration and identity"),
        (name = "KYC", description = "Identity verification"),
        (name = "Properties", description = "Property listings and documents"),
        (name = "Offers", description = "Offers and transaction lifecycle"),
        (name = "Wallets", description = "Wallet and IBAN mirrors"),
        (name = "Notifications", description = "User notifications"),
        (name = "Dashboard", description = "Aggregated dashboard data"),
        (name = "Admin", description = "Compliance review and system inspection"),
        (name = "Health", description = "Service health probes")
    )
)]
struct ApiDoc;
