// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Notification endpoints and delivery.
//!
//! Notifications are stored first and then pushed to the recipient's live
//! `/ws/notifications` connections. A recipient that is offline sees them on
//! the next `GET /v1/notifications`.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::{
    auth::Auth,
    error::ApiError,
    models::{MessageResponse, NotificationQuery, NotificationView, Page, PageQuery, UnreadCount},
    state::AppState,
    storage::NewNotification,
};

/// Store a batch of notifications, then publish each to its recipient.
///
/// Failures are logged and swallowed: the write that triggered the
/// notifications has already committed.
pub(crate) async fn deliver(state: &AppState, batch: Vec<NewNotification>) {
    if batch.is_empty() {
        return;
    }

    let count = batch.len();
    match state
        .with_db(move |db| db.create_notifications(&batch))
        .await
    {
        Ok(created) => {
            let mut delivered = 0;
            for (recipient, notification) in created {
                delivered += state.notifications.publish_to_user(recipient, notification);
            }
            tracing::debug!(count, delivered, "Notifications stored and published");
        }
        Err(e) => {
            tracing::warn!(count, error = %e.message, "Failed to store notifications");
        }
    }
}

/// List the caller's notifications, newest first.
#[utoipa::path(
    get,
    path = "/v1/notifications",
    tag = "Notifications",
    security(("bearer_auth" = [])),
    params(NotificationQuery),
    responses(
        (status = 200, description = "Page of notifications", body = Page<NotificationView>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_notifications(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Page<NotificationView>>, ApiError> {
    let paging = PageQuery {
        page: query.page,
        limit: query.limit,
    };
    let (page, limit) = paging.resolve(PageQuery::DEFAULT_LIMIT);
    let unread_only = query.unread.unwrap_or(false);

    let (items, total) = state
        .with_db(move |db| db.list_notifications(user.user_id, page, limit, unread_only))
        .await?;
    Ok(Json(Page::new(items, page, limit, total)))
}

#[utoipa::path(
    get,
    path = "/v1/notifications/unread-count",
    tag = "Notifications",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Unread notification count", body = UnreadCount),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn unread_count(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<UnreadCount>, ApiError> {
    let unread_count = state
        .with_db(move |db| db.unread_notification_count(user.user_id))
        .await?;
    Ok(Json(UnreadCount { unread_count }))
}

#[utoipa::path(
    put,
    path = "/v1/notifications/{notification_id}/read",
    tag = "Notifications",
    security(("bearer_auth" = [])),
    params(("notification_id" = u64, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification marked as read", body = MessageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Notification not found")
    )
)]
pub async fn mark_read(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(notification_id): Path<u64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .with_db(move |db| db.mark_notification_read(user.user_id, notification_id))
        .await?;
    Ok(Json(MessageResponse::new("Notification marked as read")))
}

#[utoipa::path(
    put,
    path = "/v1/notifications/read-all",
    tag = "Notifications",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All notifications marked as read", body = MessageResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn mark_all_read(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, ApiError> {
    let changed = state
        .with_db(move |db| db.mark_all_notifications_read(user.user_id))
        .await?;
    tracing::debug!(user_id = %user.user_id, changed, "Marked all notifications read");
    Ok(Json(MessageResponse::new("All notifications marked as read")))
}
