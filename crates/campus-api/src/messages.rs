use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use campus_types::api::{Claims, FlagMessageRequest, SendMessageRequest};
use campus_types::error::RealtimeError;
use campus_types::models::{Message, Notification, NotificationType};

use campus_gateway::pipeline::{self, Sender};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination: the `created_at` timestamp of the oldest
    /// message from the previous page.
    pub before: Option<String>,
}

fn default_limit() -> u32 {
    50
}

fn error_status(e: &RealtimeError) -> StatusCode {
    match e {
        RealtimeError::Validation(_) => StatusCode::BAD_REQUEST,
        RealtimeError::Subscription(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Channel authorization model: all authenticated users can post to any
/// channel they know the id of; membership gates history and notifications.
/// Content analysis runs inside the pipeline and never blocks the send.
pub async fn send_message(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let sender = Sender {
        user_id: claims.sub,
        name: claims.name.clone(),
        role: claims.role,
    };

    let message = pipeline::submit_message(
        &state.hub,
        &state.store(),
        &sender,
        channel_id,
        &req.content,
        req.message_type,
    )
    .await
    .map_err(|e| {
        if matches!(e, RealtimeError::Send(_)) {
            error!("Send to {} failed: {}", channel_id, e);
        }
        error_status(&e)
    })?;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let cid = channel_id.to_string();
    let limit = query.limit.min(200);
    let before = query.before;

    let rows = tokio::task::spawn_blocking(move || db.get_messages(&cid, limit, before.as_deref()))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let messages: Vec<Message> = rows.into_iter().map(|row| row.into_message()).collect();
    Ok(Json(messages))
}

/// Flag a message for moderator review. Sticky and non-author-only: the
/// first flag wins, and an author cannot flag their own message.
pub async fn flag_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<FlagMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let id = message_id.to_string();
    let row = tokio::task::spawn_blocking(move || db.get_message(&id))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let message = row.into_message();
    if message.sender_id == claims.sub {
        return Err(StatusCode::FORBIDDEN);
    }

    let db = state.db.clone();
    let id = message_id.to_string();
    let transitioned = tokio::task::spawn_blocking(move || db.flag_message(&id))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if transitioned {
        info!(
            "Message {} flagged by {} ({:?})",
            message_id,
            claims.sub,
            req.reason.as_deref().unwrap_or("no reason given")
        );
        let mut updated = message.clone();
        updated.is_flagged = true;
        state.hub.publish_message_update(updated);
        notify_moderators(&state, &message, req.reason.as_deref()).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Soft delete: the author or an admin-class role replaces the content with
/// the tombstone marker; thread history keeps its shape.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let id = message_id.to_string();
    let row = tokio::task::spawn_blocking(move || db.get_message(&id))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let message = row.into_message();
    if message.sender_id != claims.sub && !claims.role.is_privileged() {
        return Err(StatusCode::FORBIDDEN);
    }

    let db = state.db.clone();
    let id = message_id.to_string();
    let transitioned = tokio::task::spawn_blocking(move || db.soft_delete_message(&id))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if transitioned {
        let mut updated = message;
        updated.is_deleted = true;
        updated.content = campus_types::models::DELETED_TOMBSTONE.to_string();
        state.hub.publish_message_update(updated);
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Best effort: the flag is already recorded, so notification failures are
/// logged rather than failing the request.
async fn notify_moderators(state: &AppState, message: &Message, reason: Option<&str>) {
    let store = state.store();
    let admins = match tokio::task::spawn_blocking({
        let store = store.clone();
        move || store.admin_user_ids()
    })
    .await
    {
        Ok(Ok(admins)) => admins,
        Ok(Err(e)) => {
            error!("Moderator lookup failed: {}", e);
            return;
        }
        Err(e) => {
            error!("Moderator lookup task failed: {}", e);
            return;
        }
    };

    for admin in admins {
        let notification = Notification::new(
            admin,
            NotificationType::Moderation,
            "Message flagged for review",
            reason.unwrap_or("A user flagged this message"),
            serde_json::json!({
                "message_id": message.id,
                "channel_id": message.channel_id,
            }),
        );
        let store = store.clone();
        let to_insert = notification.clone();
        let persisted =
            tokio::task::spawn_blocking(move || store.insert_notification(&to_insert)).await;
        match persisted {
            Ok(Ok(())) => {
                state.hub.notify_user(notification.user_id, notification).await;
            }
            Ok(Err(e)) => error!("Moderation notification persist failed: {}", e),
            Err(e) => error!("Moderation notification task failed: {}", e),
        }
    }
}
