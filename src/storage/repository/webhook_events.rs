// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Webhook event repository: the idempotency ledger.
//!
//! Every inbound provider event is recorded under its (source, eventId) pair
//! before any side effect runs. [`WebhookEventRepository::claim`] performs the
//! insert-if-absent inside one write transaction, so at-least-once delivery
//! (including two concurrent deliveries of the same event) yields exactly one
//! claimed row and therefore one dispatch. Rows are never deleted: the table
//! doubles as the audit trail.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::super::database::{composite_key, Database, StorageResult, WEBHOOK_EVENTS};

/// Persisted webhook event.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredWebhookEvent {
    /// Delivery source (e.g. `striga`).
    pub source: String,
    /// Provider-assigned event id; unique per source.
    pub event_id: String,
    /// Provider event type tag.
    pub event_type: String,
    /// Raw event payload, kept opaque for audit and replay.
    pub payload: Value,
    /// Whether dispatch finished successfully.
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    /// Last dispatch error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of dispatch attempts so far.
    pub attempts: u32,
    pub received_at: DateTime<Utc>,
}

impl StoredWebhookEvent {
    /// Construct a pending (unprocessed) event row.
    pub fn new_pending(source: String, event_id: String, event_type: String, payload: Value) -> Self {
        Self {
            source,
            event_id,
            event_type,
            payload,
            processed: false,
            processed_at: None,
            error: None,
            attempts: 0,
            received_at: Utc::now(),
        }
    }
}

/// Repository for the webhook event ledger.
pub struct WebhookEventRepository<'a> {
    db: &'a Database,
}

impl<'a> WebhookEventRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Atomically claim an event for processing.
    ///
    /// Returns `true` if this call inserted the row (the caller owns the
    /// dispatch), `false` if the event was already recorded (duplicate
    /// delivery; the caller must not run side effects again).
    pub fn claim(&self, event: &StoredWebhookEvent) -> StorageResult<bool> {
        let key = composite_key(&event.source, &event.event_id);
        self.db.insert_json_if_absent(WEBHOOK_EVENTS, &key, event)
    }

    /// Get an event by (source, eventId).
    pub fn get(&self, source: &str, event_id: &str) -> StorageResult<Option<StoredWebhookEvent>> {
        self.db
            .get_json(WEBHOOK_EVENTS, &composite_key(source, event_id))
    }

    /// Mark an event fully processed.
    pub fn mark_processed(&self, source: &str, event_id: &str) -> StorageResult<()> {
        if let Some(mut event) = self.get(source, event_id)? {
            event.processed = true;
            event.processed_at = Some(Utc::now());
            event.error = None;
            event.attempts += 1;
            self.db
                .put_json(WEBHOOK_EVENTS, &composite_key(source, event_id), &event)?;
        }
        Ok(())
    }

    /// Record a dispatch failure, counting the attempt.
    pub fn record_error(&self, source: &str, event_id: &str, error: &str) -> StorageResult<()> {
        if let Some(mut event) = self.get(source, event_id)? {
            event.error = Some(error.to_string());
            event.attempts += 1;
            self.db
                .put_json(WEBHOOK_EVENTS, &composite_key(source, event_id), &event)?;
        }
        Ok(())
    }

    /// Unprocessed events eligible for a reconciliation retry.
    ///
    /// Filters out rows newer than `min_age` (still owned by the inline
    /// dispatch) and rows that exhausted `max_attempts` (dead, kept for
    /// manual inspection).
    pub fn list_retryable(
        &self,
        min_age: Duration,
        max_attempts: u32,
    ) -> StorageResult<Vec<StoredWebhookEvent>> {
        let cutoff = Utc::now() - min_age;
        Ok(self
            .db
            .scan_all_json::<StoredWebhookEvent>(WEBHOOK_EVENTS)?
            .into_iter()
            .filter(|e| !e.processed && e.received_at <= cutoff && e.attempts < max_attempts)
            .collect())
    }

    /// All events, newest first (admin inspection).
    pub fn list_all(&self) -> StorageResult<Vec<StoredWebhookEvent>> {
        let mut events: Vec<StoredWebhookEvent> = self.db.scan_all_json(WEBHOOK_EVENTS)?;
        events.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(events)
    }

    /// Count all events.
    pub fn count(&self) -> StorageResult<u64> {
        self.db.count(WEBHOOK_EVENTS)
    }

    /// Count events that never finished dispatch.
    pub fn count_unprocessed(&self) -> StorageResult<usize> {
        Ok(self
            .db
            .scan_all_json::<StoredWebhookEvent>(WEBHOOK_EVENTS)?
            .iter()
            .filter(|e| !e.processed)
            .count())
    }
}
