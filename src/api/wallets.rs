// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Wallet and digital IBAN endpoints.
//!
//! Wallet creation is asynchronous at the provider: the endpoint only files
//! the request, and the local mirror appears once the WALLET_CREATED webhook
//! confirms it.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::Auth,
    config::SUPPORTED_CURRENCIES,
    error::ApiError,
    providers::striga::StrigaClient,
    state::AppState,
    storage::{IbanRepository, KycStatus, StoredIban, StoredWallet, UserRepository, WalletRepository},
};

/// Request body for triggering wallet creation.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateWalletRequest {
    /// Currency code; must be one of the supported currencies.
    pub currency: String,
}

/// Response for a filed wallet-creation request.
#[derive(Debug, Serialize, ToSchema)]
pub struct WalletRequestedResponse {
    pub currency: String,
    /// Always `requested`; the wallet appears once the provider confirms.
    pub status: String,
}

/// List response for wallets.
#[derive(Debug, Serialize, ToSchema)]
pub struct WalletListResponse {
    pub wallets: Vec<StoredWallet>,
    pub total: usize,
}

/// List response for IBANs.
#[derive(Debug, Serialize, ToSchema)]
pub struct IbanListResponse {
    pub ibans: Vec<StoredIban>,
    pub total: usize,
}

/// List the caller's wallets.
#[utoipa::path(
    get,
    path = "/v1/wallets",
    tag = "Wallets",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Wallets listed", body = WalletListResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_wallets(
    Auth(auth): Auth,
    State(state): State<AppState>,
) -> Result<Json<WalletListResponse>, ApiError> {
    let wallets = WalletRepository::new(&state.db)
        .list_by_user(&auth.user_id)
        .map_err(|e| ApiError::internal(format!("Failed to list wallets: {e}")))?;

    Ok(Json(WalletListResponse {
        total: wallets.len(),
        wallets,
    }))
}

/// File a wallet-creation request with the provider (KYC PASSED required).
#[utoipa::path(
    post,
    path = "/v1/wallets",
    tag = "Wallets",
    request_body = CreateWalletRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 202, description = "Wallet creation requested", body = WalletRequestedResponse),
        (status = 400, description = "Unsupported currency or KYC not passed"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "User not registered"),
        (status = 503, description = "Provider unavailable")
    )
)]
pub async fn create_wallet(
    Auth(auth): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreateWalletRequest>,
) -> Result<(StatusCode, Json<WalletRequestedResponse>), ApiError> {
    let currency = request.currency.trim().to_ascii_uppercase();
    if !SUPPORTED_CURRENCIES.contains(&currency.as_str()) {
        return Err(ApiError::bad_request(format!(
            "Unsupported currency `{currency}`. Supported: {}",
            SUPPORTED_CURRENCIES.join(", ")
        )));
    }

    let user = UserRepository::new(&state.db)
        .get(&auth.user_id)
        .map_err(|_| ApiError::not_found("User not registered"))?;

    if user.kyc_status != KycStatus::Passed {
        return Err(ApiError::bad_request(
            "KYC verification required before creating wallets",
        ));
    }
    let Some(provider_user_id) = user.provider_user_id.as_deref() else {
        return Err(ApiError::service_unavailable(
            "User is not registered with the payment provider",
        ));
    };

    let client = StrigaClient::from_env()
        .map_err(|e| ApiError::service_unavailable(format!("Provider unavailable: {e}")))?;

    let idempotency_key = Uuid::new_v4().to_string();
    client
        .create_wallet(provider_user_id, &currency, &idempotency_key)
        .await
        .map_err(|e| {
            ApiError::service_unavailable(format!("Wallet creation request failed: {e}"))
        })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(WalletRequestedResponse {
            currency,
            status: "requested".to_string(),
        }),
    ))
}

/// List the caller's digital IBANs.
#[utoipa::path(
    get,
    path = "/v1/ibans",
    tag = "Wallets",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "IBANs listed", body = IbanListResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_ibans(
    Auth(auth): Auth,
    State(state): State<AppState>,
) -> Result<Json<IbanListResponse>, ApiError> {
    let ibans = IbanRepository::new(&state.db)
        .list_by_user(&auth.user_id)
        .map_err(|e| ApiError::internal(format!("Failed to list IBANs: {e}")))?;

    Ok(Json(IbanListResponse {
        total: ibans.len(),
        ibans,
    }))
}
