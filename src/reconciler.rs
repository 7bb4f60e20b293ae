// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! # Webhook Event Reconciler
//!
//! Background task that retries webhook events which never finished
//! dispatch. Two situations leave an event row with `processed = false`:
//!
//! 1. The process crashed between claiming the row and finishing dispatch.
//!    The provider's retry hits the dedup key and short-circuits, so nothing
//!    else would ever re-run the handlers.
//! 2. The event referenced a local entity that did not exist yet (e.g. a
//!    WALLET_CREATED arriving before user registration committed). The event
//!    was acknowledged but deferred.
//!
//! ## Strategy
//!
//! Every `poll_interval` (default 30 s) the reconciler:
//! 1. Lists unprocessed events older than `min_age` with attempts below the
//!    cap (events younger than `min_age` are still owned by the inline
//!    dispatch).
//! 2. Re-runs `dispatch_event` for each; handlers are idempotent, so a
//!    partial earlier run converges.
//! 3. Marks success or records the failed attempt. Events at the attempt cap
//!    are left for manual inspection via the admin event listing.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::webhooks::dispatch_event;
use crate::state::AppState;
use crate::storage::WebhookEventRepository;

/// Default interval between reconciliation sweeps.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Events younger than this still belong to the inline dispatch path.
const DEFAULT_MIN_AGE_SECS: i64 = 60;

/// Give up after this many dispatch attempts.
const MAX_ATTEMPTS: u32 = 5;

/// Background reconciler for unprocessed webhook events.
pub struct WebhookReconciler {
    state: AppState,
    poll_interval: Duration,
    min_age: chrono::Duration,
    max_attempts: u32,
}

impl WebhookReconciler {
    /// Create a new reconciler with default intervals.
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            poll_interval: DEFAULT_POLL_INTERVAL,
            min_age: chrono::Duration::seconds(DEFAULT_MIN_AGE_SECS),
            max_attempts: MAX_ATTEMPTS,
        }
    }

    /// Run the reconciler loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(reconciler.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Webhook reconciler starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Webhook reconciler shutting down");
                return;
            }

            self.poll_step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Webhook reconciler shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one sweep: find retryable events and re-dispatch each.
    async fn poll_step(&self) {
        let events = WebhookEventRepository::new(&self.state.db);

        let retryable = match events.list_retryable(self.min_age, self.max_attempts) {
            Ok(retryable) => retryable,
            Err(e) => {
                warn!(error = %e, "Webhook reconciler: failed to list events");
                return;
            }
        };

        if retryable.is_empty() {
            return;
        }

        info!(
            count = retryable.len(),
            "Webhook reconciler: retrying unprocessed events"
        );

        for event in &retryable {
            match dispatch_event(&self.state, event).await {
                Ok(()) => {
                    if let Err(e) = events.mark_processed(&event.source, &event.event_id) {
                        warn!(
                            event_id = %event.event_id,
                            error = %e,
                            "Webhook reconciler: failed to finalize event"
                        );
                    } else {
                        info!(
                            event_id = %event.event_id,
                            event_type = %event.event_type,
                            "Webhook reconciler: event processed"
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        event_id = %event.event_id,
                        event_type = %event.event_type,
                        error = %e,
                        "Webhook reconciler: retry failed"
                    );
                    if let Err(e) =
                        events.record_error(&event.source, &event.event_id, &e.to_string())
                    {
                        warn!(
                            event_id = %event.event_id,
                            error = %e,
                            "Webhook reconciler: failed to record error"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{
        Database, StoredUser, StoredWebhookEvent, UserRepository, UserRole, WalletRepository,
    };
    use serde_json::json;

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (AppState::new(db), dir)
    }

    fn reconciler(state: &AppState) -> WebhookReconciler {
        WebhookReconciler {
            state: state.clone(),
            poll_interval: Duration::from_millis(10),
            min_age: chrono::Duration::zero(),
            max_attempts: MAX_ATTEMPTS,
        }
    }

    fn deferred_wallet_event(state: &AppState, event_id: &str) {
        let events = WebhookEventRepository::new(&state.db);
        let event = StoredWebhookEvent::new_pending(
            "striga".to_string(),
            event_id.to_string(),
            "WALLET_CREATED".to_string(),
            json!({
                "eventType": "WALLET_CREATED",
                "eventId": event_id,
                "data": {"userId": "ext-1", "walletId": "w-1", "currency": "BTC"}
            }),
        );
        assert!(events.claim(&event).unwrap());
        events
            .record_error("striga", event_id, "no user for provider id ext-1")
            .unwrap();
    }

    fn register_user(state: &AppState) {
        let users = UserRepository::new(&state.db);
        users
            .create(&StoredUser::new(
                "user-1".to_string(),
                "user-1@example.com".to_string(),
                "Rui".to_string(),
                "Pereira".to_string(),
                UserRole::Buyer,
            ))
            .unwrap();
        users.link_provider("user-1", "ext-1").unwrap();
    }

    #[tokio::test]
    async fn deferred_event_is_applied_once_entity_exists() {
        let (state, _dir) = test_state();
        deferred_wallet_event(&state, "evt-1");

        // Entity still missing: the sweep records another failed attempt
        reconciler(&state).poll_step().await;
        let events = WebhookEventRepository::new(&state.db);
        let stored = events.get("striga", "evt-1").unwrap().unwrap();
        assert!(!stored.processed);
        assert_eq!(stored.attempts, 2);

        // After registration the next sweep converges
        register_user(&state);
        reconciler(&state).poll_step().await;

        let stored = events.get("striga", "evt-1").unwrap().unwrap();
        assert!(stored.processed);
        assert!(stored.error.is_none());

        let wallets = WalletRepository::new(&state.db);
        assert!(wallets.get("user-1", "BTC").unwrap().is_some());
    }

    #[tokio::test]
    async fn events_at_the_attempt_cap_are_left_alone() {
        let (state, _dir) = test_state();
        deferred_wallet_event(&state, "evt-1");

        let events = WebhookEventRepository::new(&state.db);
        for _ in 0..MAX_ATTEMPTS {
            events.record_error("striga", "evt-1", "still missing").unwrap();
        }

        register_user(&state);
        reconciler(&state).poll_step().await;

        // Dead row: not retried even though the entity now exists
        let stored = events.get("striga", "evt-1").unwrap().unwrap();
        assert!(!stored.processed);

        let wallets = WalletRepository::new(&state.db);
        assert!(wallets.get("user-1", "BTC").unwrap().is_none());
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let (state, _dir) = test_state();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(reconciler(&state).run(shutdown.clone()));
        shutdown.cancel();
        handle.await.unwrap();
    }
}
