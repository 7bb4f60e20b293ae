// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Notification repository.
//!
//! Notifications are keyed by (user, notification id). Webhook-driven
//! notifications reuse the webhook event id as the notification id, so a
//! redelivered event upserts the same row instead of duplicating it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{composite_key, Database, StorageResult, NOTIFICATIONS};

/// Notification category shown to the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    KycUpdate,
    IbanCreated,
    NewOffer,
    OfferUpdate,
}

/// Persisted notification.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredNotification {
    /// Notification identifier. Webhook-driven rows use the webhook event id.
    pub notification_id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl StoredNotification {
    pub fn new(
        notification_id: String,
        user_id: String,
        title: String,
        message: String,
        kind: NotificationKind,
    ) -> Self {
        Self {
            notification_id,
            user_id,
            title,
            message,
            kind,
            read: false,
            created_at: Utc::now(),
        }
    }
}

/// Repository for notifications.
pub struct NotificationRepository<'a> {
    db: &'a Database,
}

impl<'a> NotificationRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create or overwrite a notification (idempotent per notification id).
    pub fn upsert(&self, notification: &StoredNotification) -> StorageResult<()> {
        let key = composite_key(&notification.user_id, &notification.notification_id);
        self.db.put_json(NOTIFICATIONS, &key, notification)
    }

    /// List a user's notifications, newest first.
    pub fn list_by_user(&self, user_id: &str) -> StorageResult<Vec<StoredNotification>> {
        let prefix = format!("{user_id}|");
        let mut notifications: Vec<StoredNotification> =
            self.db.scan_prefix_json(NOTIFICATIONS, &prefix)?;
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    /// Count a user's unread notifications.
    pub fn unread_count(&self, user_id: &str) -> StorageResult<usize> {
        Ok(self
            .list_by_user(user_id)?
            .iter()
            .filter(|n| !n.read)
            .count())
    }

    /// Mark one notification read. Returns `false` if it does not exist.
    pub fn mark_read(&self, user_id: &str, notification_id: &str) -> StorageResult<bool> {
        let key = composite_key(user_id, notification_id);
        match self.db.get_json::<StoredNotification>(NOTIFICATIONS, &key)? {
            Some(mut notification) => {
                notification.read = true;
                self.db.put_json(NOTIFICATIONS, &key, &notification)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn sample(user: &str, id: &str) -> StoredNotification {
        StoredNotification::new(
            id.to_string(),
            user.to_string(),
            "KYC Status Update".to_string(),
            "Your KYC verification status has been updated to: PASSED".to_string(),
            NotificationKind::KycUpdate,
        )
    }

    #[test]
    fn upsert_with_same_id_does_not_duplicate() {
        let (db, _dir) = temp_db();
        let repo = NotificationRepository::new(&db);

        repo.upsert(&sample("user-1", "evt-1")).unwrap();
        repo.upsert(&sample("user-1", "evt-1")).unwrap();

        assert_eq!(repo.list_by_user("user-1").unwrap().len(), 1);
    }

    #[test]
    fn unread_count_and_mark_read() {
        let (db, _dir) = temp_db();
        let repo = NotificationRepository::new(&db);
        repo.upsert(&sample("user-1", "n1")).unwrap();
        repo.upsert(&sample("user-1", "n2")).unwrap();

        assert_eq!(repo.unread_count("user-1").unwrap(), 2);

        assert!(repo.mark_read("user-1", "n1").unwrap());
        assert_eq!(repo.unread_count("user-1").unwrap(), 1);

        assert!(!repo.mark_read("user-1", "missing").unwrap());
    }

    #[test]
    fn notifications_are_scoped_per_user() {
        let (db, _dir) = temp_db();
        let repo = NotificationRepository::new(&db);
        repo.upsert(&sample("user-1", "n1")).unwrap();
        repo.upsert(&sample("user-2", "n1")).unwrap();

        assert_eq!(repo.list_by_user("user-1").unwrap().len(), 1);
        assert_eq!(repo.list_by_user("user-2").unwrap().len(), 1);
    }
}
