// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! KYC endpoints: session start and status polling.
//!
//! The status endpoint reconciles against the provider on every read while
//! the local status is non-terminal, so the frontend converges even if a
//! KYC_STATUS_CHANGED webhook was lost.

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::Auth,
    error::ApiError,
    providers::striga::{self, StrigaClient},
    state::AppState,
    storage::{KycStatus, StoredUser, UserRepository},
};

/// Response for KYC session creation.
#[derive(Debug, Serialize, ToSchema)]
pub struct KycStartResponse {
    pub kyc_status: KycStatus,
    pub session_id: String,
    /// Provider URL where the user completes verification, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_url: Option<String>,
}

/// Response for KYC status polling.
#[derive(Debug, Serialize, ToSchema)]
pub struct KycStatusResponse {
    pub kyc_status: KycStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Start a KYC verification session with the provider.
#[utoipa::path(
    post,
    path = "/v1/kyc/start",
    tag = "KYC",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "KYC session opened", body = KycStartResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "User not registered"),
        (status = 422, description = "KYC already completed"),
        (status = 503, description = "Provider unavailable")
    )
)]
pub async fn start_kyc(
    Auth(auth): Auth,
    State(state): State<AppState>,
) -> Result<Json<KycStartResponse>, ApiError> {
    let users = UserRepository::new(&state.db);
    let user = users
        .get(&auth.user_id)
        .map_err(|_| ApiError::not_found("User not registered"))?;

    if user.kyc_status == KycStatus::Passed {
        return Err(ApiError::unprocessable("KYC verification already passed"));
    }

    if !StrigaClient::is_configured() {
        return Err(ApiError::service_unavailable(
            "KYC provider is not configured. Set STRIGA_* environment variables.",
        ));
    }

    // Late provider linkage: registration may have run while the provider
    // was unreachable.
    let user = match user.provider_user_id {
        Some(_) => user,
        None => super::users::register_with_provider(&state, &user).await?,
    };
    let provider_user_id = user
        .provider_user_id
        .as_deref()
        .ok_or_else(|| ApiError::internal("Provider linkage missing after registration"))?;

    let client = StrigaClient::from_env()
        .map_err(|e| ApiError::service_unavailable(format!("Provider unavailable: {e}")))?;

    let idempotency_key =
        Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("kyc:{}", user.user_id).as_bytes()).to_string();
    let session = client
        .start_kyc(provider_user_id, &idempotency_key)
        .await
        .map_err(|e| ApiError::service_unavailable(format!("Failed to start KYC: {e}")))?;

    let updated = users
        .set_kyc_status(&user.user_id, KycStatus::Initiated, Some(&session.session_id))
        .map_err(|e| ApiError::internal(format!("Failed to store KYC session: {e}")))?;

    state.cache.invalidate_owner(&user.user_id);

    Ok(Json(KycStartResponse {
        kyc_status: updated.kyc_status,
        session_id: session.session_id,
        verification_url: session.verification_url,
    }))
}

/// Get the KYC status, reconciled against the provider when non-terminal.
#[utoipa::path(
    get,
    path = "/v1/kyc/status",
    tag = "KYC",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current KYC status", body = KycStatusResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "User not registered")
    )
)]
pub async fn kyc_status(
    Auth(auth): Auth,
    State(state): State<AppState>,
) -> Result<Json<KycStatusResponse>, ApiError> {
    let users = UserRepository::new(&state.db);
    let user = users
        .get(&auth.user_id)
        .map_err(|_| ApiError::not_found("User not registered"))?;

    let user = reconcile_kyc_status(&state, user).await;

    Ok(Json(KycStatusResponse {
        kyc_status: user.kyc_status,
        session_id: user.kyc_session_id.clone(),
    }))
}

/// Poll the provider and persist a changed KYC status.
///
/// Failures are logged and the local record returned unchanged; this path
/// must never take a read endpoint down.
pub(crate) async fn reconcile_kyc_status(state: &AppState, user: StoredUser) -> StoredUser {
    if user.kyc_status.is_terminal() {
        return user;
    }
    let Some(provider_user_id) = user.provider_user_id.as_deref() else {
        return user;
    };
    if !StrigaClient::is_configured() {
        return user;
    }

    let client = match StrigaClient::from_env() {
        Ok(client) => client,
        Err(e) => {
            warn!(user_id = %user.user_id, error = %e, "skipping KYC reconcile: client error");
            return user;
        }
    };

    let raw_status = match client.fetch_kyc_status(provider_user_id).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(user_id = %user.user_id, error = %e, "failed to fetch provider KYC status");
            return user;
        }
    };

    let Some(mapped) = striga::map_kyc_status(&raw_status) else {
        warn!(user_id = %user.user_id, %raw_status, "unrecognized provider KYC status");
        return user;
    };

    if mapped == user.kyc_status {
        return user;
    }

    match UserRepository::new(&state.db).set_kyc_status(&user.user_id, mapped, None) {
        Ok(updated) => {
            state.cache.invalidate_owner(&updated.user_id);
            updated
        }
        Err(e) => {
            warn!(user_id = %user.user_id, error = %e, "failed to persist reconciled KYC status");
            user
        }
    }
}
