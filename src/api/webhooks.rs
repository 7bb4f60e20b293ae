// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Striga webhook ingestion.
//!
//! The provider delivers events at least once. Correctness rests on two
//! rules: the (source, eventId) pair is claimed atomically before any side
//! effect runs, and every handler is idempotent (upserts keyed by stable
//! ids), so a redelivered or reconciled event converges instead of
//! duplicating effects.
//!
//! Dispatch outcome drives the transport response:
//!
//! - bad signature → 401 (provider will re-send, nothing recorded)
//! - payload without an event id → 500
//! - duplicate delivery → 200, no side effects
//! - unknown event type → 200, row marked processed (forward compatible)
//! - local entity missing → 200, error recorded; the reconciler retries
//! - handler failure → 500, error recorded; provider retry plus reconciler

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::{
    config::{SUPPORTED_CURRENCIES, WEBHOOK_SOURCE_STRIGA},
    error::ApiError,
    providers::striga::{self, StrigaClient},
    state::AppState,
    storage::{
        IbanRepository, KycStatus, NotificationKind, NotificationRepository, PaymentRepository,
        PaymentStatus, StoredIban, StoredNotification, StoredWebhookEvent, UserRepository,
        UserRole, WalletRepository, WebhookEventRepository,
    },
};

/// Signature header set by the provider on every delivery.
const SIGNATURE_HEADER: &str = "x-signature";

/// Acknowledgement body returned to the provider.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

/// Webhook envelope common to all event types. The per-type `data` object
/// stays inside the stored payload and is read at dispatch time.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEnvelope {
    event_type: String,
    event_id: String,
}

/// Error raised while applying an event's effect.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No local record for the provider's external id. The event stays
    /// unprocessed and the reconciler retries it later.
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    /// The handler itself failed (bad event data, storage failure).
    #[error("{0}")]
    Handler(String),
}

impl From<crate::storage::StorageError> for DispatchError {
    fn from(e: crate::storage::StorageError) -> Self {
        DispatchError::Handler(format!("storage error: {e}"))
    }
}

/// Ingest a signed Striga webhook.
#[utoipa::path(
    post,
    path = "/v1/webhooks/striga",
    tag = "Webhooks",
    request_body = Vec<u8>,
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 401, description = "Invalid signature"),
        (status = 500, description = "Malformed payload or handler failure")
    )
)]
pub async fn receive_striga_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let secret = striga::webhook_secret_from_env().map_err(|_| {
        ApiError::service_unavailable(
            "Webhook ingestion is not configured. Set STRIGA_WEBHOOK_SECRET.",
        )
    })?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    receive(&state, &secret, &body, signature).await
}

/// Signature check, claim, dispatch, finalize. Separated from the axum
/// handler so tests can inject the secret.
async fn receive(
    state: &AppState,
    secret: &str,
    body: &[u8],
    signature: &str,
) -> Result<Json<WebhookAck>, ApiError> {
    if !striga::verify_webhook_signature(secret, body, signature) {
        warn!("webhook rejected: invalid signature");
        return Err(ApiError::unauthorized("Invalid signature"));
    }

    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::internal(format!("Webhook payload is not valid JSON: {e}")))?;
    let envelope: WebhookEnvelope = serde_json::from_value(payload.clone())
        .map_err(|e| ApiError::internal(format!("Webhook payload missing event fields: {e}")))?;
    if envelope.event_id.trim().is_empty() {
        return Err(ApiError::internal("Webhook payload has an empty eventId"));
    }

    let events = WebhookEventRepository::new(&state.db);
    let event = StoredWebhookEvent::new_pending(
        WEBHOOK_SOURCE_STRIGA.to_string(),
        envelope.event_id.clone(),
        envelope.event_type.clone(),
        payload,
    );

    let claimed = events
        .claim(&event)
        .map_err(|e| ApiError::internal(format!("Failed to record webhook event: {e}")))?;
    if !claimed {
        info!(event_id = %envelope.event_id, "duplicate webhook event received");
        return Ok(Json(WebhookAck { received: true }));
    }

    finalize(state, &event, dispatch_event(state, &event).await)
}

/// Persist the dispatch outcome and translate it to a transport response.
fn finalize(
    state: &AppState,
    event: &StoredWebhookEvent,
    outcome: Result<(), DispatchError>,
) -> Result<Json<WebhookAck>, ApiError> {
    let events = WebhookEventRepository::new(&state.db);
    match outcome {
        Ok(()) => {
            events
                .mark_processed(&event.source, &event.event_id)
                .map_err(|e| ApiError::internal(format!("Failed to finalize event: {e}")))?;
            Ok(Json(WebhookAck { received: true }))
        }
        Err(DispatchError::EntityNotFound(message)) => {
            warn!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                %message,
                "webhook event deferred: local entity not found"
            );
            events
                .record_error(&event.source, &event.event_id, &message)
                .map_err(|e| ApiError::internal(format!("Failed to record event error: {e}")))?;
            // Acknowledged: the reconciler owns the retry, not the provider.
            Ok(Json(WebhookAck { received: true }))
        }
        Err(DispatchError::Handler(message)) => {
            error!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                %message,
                "webhook event dispatch failed"
            );
            if let Err(e) = events.record_error(&event.source, &event.event_id, &message) {
                error!(event_id = %event.event_id, error = %e, "failed to record event error");
            }
            Err(ApiError::internal("Webhook processing failed"))
        }
    }
}

/// Apply one event's effect. Also invoked by the reconciler for retries,
/// so every path in here must be idempotent.
pub(crate) async fn dispatch_event(
    state: &AppState,
    event: &StoredWebhookEvent,
) -> Result<(), DispatchError> {
    let data = event.payload.get("data").cloned().unwrap_or(Value::Null);

    match event.event_type.as_str() {
        "KYC_STATUS_CHANGED" => handle_kyc_status_changed(state, &event.event_id, &data).await,
        "WALLET_CREATED" => handle_wallet_created(state, &data),
        "TRANSACTION_COMPLETED" => handle_transaction_completed(state, &data),
        "IBAN_CREATED" => handle_iban_created(state, &event.event_id, &data),
        other => {
            info!(event_type = %other, "unhandled webhook event type");
            Ok(())
        }
    }
}

fn data_str<'a>(data: &'a Value, field: &str) -> Result<&'a str, DispatchError> {
    data.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| DispatchError::Handler(format!("event data missing `{field}`")))
}

/// KYC_STATUS_CHANGED: mirror the status, notify the user, and on PASSED
/// trigger wallet (and, for sellers, IBAN) provisioning at the provider.
async fn handle_kyc_status_changed(
    state: &AppState,
    event_id: &str,
    data: &Value,
) -> Result<(), DispatchError> {
    let provider_user_id = data_str(data, "userId")?;
    let raw_status = data_str(data, "status")?;
    let session_id = data.get("sessionId").and_then(Value::as_str);

    let users = UserRepository::new(&state.db);
    let user = users
        .get_by_provider_id(provider_user_id)?
        .ok_or_else(|| {
            DispatchError::EntityNotFound(format!("no user for provider id {provider_user_id}"))
        })?;

    let status = striga::map_kyc_status(raw_status).ok_or_else(|| {
        DispatchError::Handler(format!("unrecognized KYC status `{raw_status}`"))
    })?;

    users.set_kyc_status(&user.user_id, status, session_id)?;

    let notifications = NotificationRepository::new(&state.db);
    notifications.upsert(&StoredNotification::new(
        event_id.to_string(),
        user.user_id.clone(),
        "KYC Status Update".to_string(),
        format!("Your KYC verification status has been updated to: {raw_status}"),
        NotificationKind::KycUpdate,
    ))?;

    state.cache.invalidate_owner(&user.user_id);

    info!(user_id = %user.user_id, status = ?status, "KYC status updated");

    if status == KycStatus::Passed {
        provision_provider_accounts(&user, provider_user_id, event_id).await;
    }

    Ok(())
}

/// Fire wallet-creation requests (one per supported currency) and, for
/// sellers, an IBAN request. Fire-and-forget: confirmation arrives via
/// WALLET_CREATED / IBAN_CREATED webhooks, and per-call idempotency keys
/// make redelivered triggers safe. Individual failures are logged only;
/// the provider-side resource can still be provisioned on the next
/// reconciliation pass of this event.
async fn provision_provider_accounts(
    user: &crate::storage::StoredUser,
    provider_user_id: &str,
    event_id: &str,
) {
    let client = match StrigaClient::from_env() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "skipping provider account provisioning: client not configured");
            return;
        }
    };

    for (currency, idempotency_key) in wallet_creation_requests(event_id) {
        if let Err(e) = client
            .create_wallet(provider_user_id, currency, &idempotency_key)
            .await
        {
            warn!(
                user_id = %user.user_id,
                %currency,
                error = %e,
                "failed to request wallet creation"
            );
        }
    }

    if user.role == UserRole::Seller {
        let idempotency_key = format!("{event_id}-iban");
        if let Err(e) = client.create_iban(provider_user_id, &idempotency_key).await {
            warn!(user_id = %user.user_id, error = %e, "failed to request IBAN creation");
        }
    }
}

/// One wallet-creation request per supported currency, each with a
/// deterministic idempotency key derived from the triggering event.
fn wallet_creation_requests(event_id: &str) -> Vec<(&'static str, String)> {
    SUPPORTED_CURRENCIES
        .iter()
        .map(|currency| (*currency, format!("{event_id}-{currency}")))
        .collect()
}

/// WALLET_CREATED: upsert the (user, currency) wallet mirror.
fn handle_wallet_created(state: &AppState, data: &Value) -> Result<(), DispatchError> {
    let provider_user_id = data_str(data, "userId")?;
    let wallet_id = data_str(data, "walletId")?;
    let currency = data_str(data, "currency")?;
    let address = data.get("address").and_then(Value::as_str);

    let users = UserRepository::new(&state.db);
    let user = users
        .get_by_provider_id(provider_user_id)?
        .ok_or_else(|| {
            DispatchError::EntityNotFound(format!("no user for provider id {provider_user_id}"))
        })?;

    let wallets = WalletRepository::new(&state.db);
    wallets.upsert_from_provider(&user.user_id, currency, wallet_id, address)?;

    state.cache.invalidate_owner(&user.user_id);

    info!(user_id = %user.user_id, %currency, %wallet_id, "wallet confirmed");
    Ok(())
}

/// TRANSACTION_COMPLETED: resolve the mirrored payment by tx hash.
fn handle_transaction_completed(state: &AppState, data: &Value) -> Result<(), DispatchError> {
    let tx_hash = data_str(data, "transactionId")?;
    let raw_status = data_str(data, "status")?;

    let status = if raw_status.eq_ignore_ascii_case("COMPLETED") {
        PaymentStatus::Completed
    } else {
        PaymentStatus::Failed
    };

    let payments = PaymentRepository::new(&state.db);
    let updated = payments.set_status(tx_hash, status)?;
    if !updated {
        // Transfers not initiated by this service are not mirrored locally.
        info!(%tx_hash, "transaction event for unknown payment, ignoring");
    } else {
        info!(%tx_hash, status = ?status, "payment resolved");
    }
    Ok(())
}

/// IBAN_CREATED: upsert the IBAN mirror and notify the user.
fn handle_iban_created(
    state: &AppState,
    event_id: &str,
    data: &Value,
) -> Result<(), DispatchError> {
    let provider_user_id = data_str(data, "userId")?;
    let iban = data_str(data, "iban")?;
    let bank_name = data_str(data, "bankName")?;
    let account_number = data_str(data, "accountNumber")?;

    let users = UserRepository::new(&state.db);
    let user = users
        .get_by_provider_id(provider_user_id)?
        .ok_or_else(|| {
            DispatchError::EntityNotFound(format!("no user for provider id {provider_user_id}"))
        })?;

    let ibans = IbanRepository::new(&state.db);
    ibans.upsert(&StoredIban {
        user_id: user.user_id.clone(),
        iban: iban.to_string(),
        bank_name: bank_name.to_string(),
        account_number: account_number.to_string(),
        active: true,
        created_at: chrono::Utc::now(),
    })?;

    let notifications = NotificationRepository::new(&state.db);
    notifications.upsert(&StoredNotification::new(
        event_id.to_string(),
        user.user_id.clone(),
        "Digital IBAN Created".to_string(),
        "Your digital IBAN has been successfully created and is ready to use.".to_string(),
        NotificationKind::IbanCreated,
    ))?;

    state.cache.invalidate_owner(&user.user_id);

    info!(user_id = %user.user_id, %iban, "digital IBAN created");
    Ok(())
}
