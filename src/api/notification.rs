//! Notification API handlers, always scoped to the caller

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::error::ApiResult;
use crate::auth::CurrentUser;
use crate::domain::Action;
use crate::infrastructure::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageOwnNotifications)?;

    let notifications = state
        .notifications
        .list_for_user(current.id, query.unread)
        .await?;
    let total = notifications.len();

    Ok(Json(json!({ "notifications": notifications, "total": total })))
}

pub async fn unread_count(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageOwnNotifications)?;

    Ok(Json(state.notifications.unread_count(current.id).await?))
}

pub async fn mark_read(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageOwnNotifications)?;

    let notification = state.notifications.mark_read(current.id, id).await?;

    Ok(Json(json!({ "notification": notification })))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageOwnNotifications)?;

    let updated = state.notifications.mark_all_read(current.id).await?;

    Ok(Json(json!({ "updated": updated })))
}

pub async fn clear_all(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageOwnNotifications)?;

    let deleted = state.notifications.clear_all(current.id).await?;

    Ok(Json(json!({ "deleted": deleted })))
}
