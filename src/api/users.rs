// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! User registration and identity endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{Auth, Role},
    error::ApiError,
    providers::striga::StrigaClient,
    state::AppState,
    storage::{KycStatus, StoredUser, UserRepository, UserRole},
};

/// Request body for registering the authenticated user.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Marketplace role; must match the role claim of the token.
    pub role: UserRole,
}

/// User profile returned to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserResponse {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub kyc_status: KycStatus,
    /// Whether the user is registered with the payment provider.
    pub provider_linked: bool,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub created_at: String,
}

/// Response for GET /v1/users/me.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserMeResponse {
    /// User's unique ID (from Clerk)
    pub user_id: String,
    /// Role carried by the token
    pub role: Role,
    /// Session ID (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Local profile, present once the user registered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<UserResponse>,
}

pub(crate) fn to_response(user: &StoredUser) -> UserResponse {
    UserResponse {
        user_id: user.user_id.clone(),
        email: user.email.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        role: user.role,
        kyc_status: user.kyc_status,
        provider_linked: user.provider_user_id.is_some(),
        email_verified: user.email_verified,
        phone_verified: user.phone_verified,
        created_at: user.created_at.to_rfc3339(),
    }
}

fn roles_match(claim: Role, requested: UserRole) -> bool {
    matches!(
        (claim, requested),
        (Role::Admin, UserRole::Admin) | (Role::Seller, UserRole::Seller) | (Role::Buyer, UserRole::Buyer)
    )
}

/// Register the authenticated user locally and with the payment provider.
///
/// Provider registration is best-effort: when the provider is unreachable or
/// unconfigured the local account is still created, and the linkage is
/// retried when a KYC session is started.
#[utoipa::path(
    post,
    path = "/v1/users/register",
    tag = "Users",
    request_body = RegisterRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "User registered", body = UserResponse),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Already registered")
    )
)]
pub async fn register_user(
    Auth(auth): Auth,
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let email = request.email.trim().to_ascii_lowercase();
    if !email.contains('@') {
        return Err(ApiError::bad_request("A valid email address is required"));
    }
    if request.first_name.trim().is_empty() || request.last_name.trim().is_empty() {
        return Err(ApiError::bad_request("First and last name are required"));
    }
    if !roles_match(auth.role, request.role) {
        return Err(ApiError::forbidden(
            "Requested role does not match the authenticated role",
        ));
    }

    let users = UserRepository::new(&state.db);
    let mut user = StoredUser::new(
        auth.user_id.clone(),
        email,
        request.first_name.trim().to_string(),
        request.last_name.trim().to_string(),
        request.role,
    );

    users.create(&user).map_err(|e| match e {
        crate::storage::StorageError::AlreadyExists(_) => {
            ApiError::conflict("User is already registered")
        }
        other => ApiError::internal(format!("Failed to store user: {other}")),
    })?;

    if StrigaClient::is_configured() {
        match register_with_provider(&state, &user).await {
            Ok(linked) => user = linked,
            Err(e) => {
                warn!(user_id = %user.user_id, error = %e.message, "provider registration deferred");
            }
        }
    }

    Ok((StatusCode::CREATED, Json(to_response(&user))))
}

/// Create the provider-side user and index the external id.
pub(crate) async fn register_with_provider(
    state: &AppState,
    user: &StoredUser,
) -> Result<StoredUser, ApiError> {
    let client = StrigaClient::from_env()
        .map_err(|e| ApiError::service_unavailable(format!("Provider unavailable: {e}")))?;

    // Stable v5 key: retried registrations reuse the same idempotency key
    let idempotency_key =
        Uuid::new_v5(&Uuid::NAMESPACE_OID, user.user_id.as_bytes()).to_string();

    let provider_user = client
        .create_user(&user.email, &user.first_name, &user.last_name, &idempotency_key)
        .await
        .map_err(|e| ApiError::service_unavailable(format!("Provider registration failed: {e}")))?;

    UserRepository::new(&state.db)
        .link_provider(&user.user_id, &provider_user.provider_user_id)
        .map_err(|e| ApiError::internal(format!("Failed to link provider user: {e}")))
}

/// Get the current authenticated user's identity and profile.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "User information", body = UserMeResponse),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn get_current_user(
    Auth(auth): Auth,
    State(state): State<AppState>,
) -> Result<Json<UserMeResponse>, ApiError> {
    let users = UserRepository::new(&state.db);
    let profile = users.get(&auth.user_id).ok().map(|u| to_response(&u));

    Ok(Json(UserMeResponse {
        user_id: auth.user_id,
        role: auth.role,
        session_id: auth.session_id,
        profile,
    }))
}
