use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{AppError, AppResult};
use crate::models::Notification;
use crate::state::AppState;
use crate::store::Page;

#[derive(Deserialize)]
pub struct NotificationListQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

#[derive(Serialize)]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

/// Notifications are private; someone else's id behaves as if it did not
/// exist.
async fn owned_notification(state: &AppState, id: Uuid, user_id: Uuid) -> AppResult<Notification> {
    state
        .store
        .notification(id)
        .await?
        .filter(|notification| notification.user_id == user_id)
        .ok_or_else(AppError::not_found)
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Query(params): Query<NotificationListQuery>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Notification>>> {
    let page = Page::new(params.skip.unwrap_or(0), params.limit.unwrap_or(20));
    let notifications = state
        .store
        .notifications_for_user(user.user.id, params.unread_only, page)
        .await?;
    Ok(Json(notifications))
}

pub async fn unread_count(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<UnreadCountResponse>> {
    let unread = state.store.unread_count(user.user.id).await?;
    Ok(Json(UnreadCountResponse { unread }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Notification>> {
    let notification = owned_notification(&state, id, user.user.id).await?;
    let updated = state.store.mark_notification_read(notification.id).await?;
    Ok(Json(updated))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<MarkAllReadResponse>> {
    let updated = state.store.mark_all_read(user.user.id).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<StatusCode> {
    let notification = owned_notification(&state, id, user.user.id).await?;
    state.store.delete_notification(notification.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
