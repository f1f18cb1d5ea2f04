use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use campus_types::api::{Claims, CreateNotificationRequest, UnreadCountResponse};
use campus_types::models::Notification;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn get_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let uid = claims.sub.to_string();
    let limit = query.limit.min(200);

    let rows = tokio::task::spawn_blocking(move || db.get_notifications(&uid, limit))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let notifications: Vec<Notification> =
        rows.into_iter().map(|row| row.into_notification()).collect();
    Ok(Json(notifications))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let uid = claims.sub.to_string();

    let count = tokio::task::spawn_blocking(move || db.unread_count(&uid))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(UnreadCountResponse { count }))
}

/// Monotonic read transition; marking an already-read id is a no-op.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let id = notification_id.to_string();

    tokio::task::spawn_blocking(move || db.mark_notification_read(&id))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Admin-only direct notification creation, used by platform tooling.
pub async fn create_notification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateNotificationRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if !claims.role.is_privileged() {
        return Err(StatusCode::FORBIDDEN);
    }

    let notification = Notification::new(req.user_id, req.kind, req.title, req.message, req.data);

    let store = state.store();
    let to_insert = notification.clone();
    tokio::task::spawn_blocking(move || store.insert_notification(&to_insert))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    state
        .hub
        .notify_user(notification.user_id, notification.clone())
        .await;

    Ok((StatusCode::CREATED, Json(notification)))
}
