// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Notification endpoints.
//!
//! The unread count is the hottest poll of the dashboard, so it goes
//! through the response cache; every write path that touches a user's
//! notifications invalidates that user's cache entries.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::{
    auth::Auth,
    error::ApiError,
    state::AppState,
    storage::{cache::keys, NotificationRepository, StoredNotification},
};

/// List response for notifications.
#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationListResponse {
    pub notifications: Vec<StoredNotification>,
    pub total: usize,
}

/// Unread count response.
#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationCountResponse {
    pub unread: usize,
}

/// List the caller's notifications, newest first.
#[utoipa::path(
    get,
    path = "/v1/notifications",
    tag = "Notifications",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Notifications listed", body = NotificationListResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_notifications(
    Auth(auth): Auth,
    State(state): State<AppState>,
) -> Result<Json<NotificationListResponse>, ApiError> {
    let notifications = NotificationRepository::new(&state.db)
        .list_by_user(&auth.user_id)
        .map_err(|e| ApiError::internal(format!("Failed to list notifications: {e}")))?;

    Ok(Json(NotificationListResponse {
        total: notifications.len(),
        notifications,
    }))
}

/// Unread notification count (cached).
#[utoipa::path(
    get,
    path = "/v1/notifications/count",
    tag = "Notifications",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Unread count", body = NotificationCountResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn notification_count(
    Auth(auth): Auth,
    State(state): State<AppState>,
) -> Result<Json<NotificationCountResponse>, ApiError> {
    let cache_key = keys::notification_count(&auth.user_id);
    if let Some(cached) = state.cache.get(&cache_key) {
        let unread = cached.get("unread").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        return Ok(Json(NotificationCountResponse { unread }));
    }

    let unread = NotificationRepository::new(&state.db)
        .unread_count(&auth.user_id)
        .map_err(|e| ApiError::internal(format!("Failed to count notifications: {e}")))?;

    state
        .cache
        .put(&auth.user_id, &cache_key, json!({ "unread": unread }));

    Ok(Json(NotificationCountResponse { unread }))
}

/// Mark one notification read.
#[utoipa::path(
    post,
    path = "/v1/notifications/{notification_id}/read",
    tag = "Notifications",
    params(("notification_id" = String, Path, description = "Notification ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Marked read"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not found")
    )
)]
pub async fn mark_notification_read(
    Auth(auth): Auth,
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let marked = NotificationRepository::new(&state.db)
        .mark_read(&auth.user_id, &notification_id)
        .map_err(|e| ApiError::internal(format!("Failed to mark notification: {e}")))?;

    if !marked {
        return Err(ApiError::not_found("Notification not found"));
    }

    state.cache.invalidate_owner(&auth.user_id);

    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthenticatedUser, Role};
    use crate::storage::{Database, NotificationKind};

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (AppState::new(db), dir)
    }

    fn auth(user_id: &str) -> Auth {
        Auth(AuthenticatedUser {
            user_id: user_id.to_string(),
            role: Role::Buyer,
            session_id: None,
            issuer: "test".to_string(),
            expires_at: 0,
        })
    }

    fn add_notification(state: &AppState, user: &str, id: &str) {
        NotificationRepository::new(&state.db)
            .upsert(&StoredNotification::new(
                id.to_string(),
                user.to_string(),
                "Test".to_string(),
                "Test message".to_string(),
                NotificationKind::KycUpdate,
            ))
            .unwrap();
    }

    #[tokio::test]
    async fn count_is_cached_until_invalidated() {
        let (state, _dir) = test_state();
        add_notification(&state, "user-1", "n1");

        let first = notification_count(auth("user-1"), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(first.0.unread, 1);

        // A direct write bypassing invalidation is masked by the cache...
        add_notification(&state, "user-1", "n2");
        let cached = notification_count(auth("user-1"), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(cached.0.unread, 1);

        // ...until the owner's entries are invalidated
        state.cache.invalidate_owner("user-1");
        let fresh = notification_count(auth("user-1"), State(state))
            .await
            .unwrap();
        assert_eq!(fresh.0.unread, 2);
    }

    #[tokio::test]
    async fn mark_read_updates_count_and_404s_on_missing() {
        let (state, _dir) = test_state();
        add_notification(&state, "user-1", "n1");

        mark_notification_read(
            auth("user-1"),
            State(state.clone()),
            Path("n1".to_string()),
        )
        .await
        .unwrap();

        let count = notification_count(auth("user-1"), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(count.0.unread, 0);

        let err = mark_notification_read(
            auth("user-1"),
            State(state),
            Path("missing".to_string()),
        )
        .await
        .expect_err("missing notification must 404");
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
    }
}
