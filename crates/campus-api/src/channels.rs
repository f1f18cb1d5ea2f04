use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{error, warn};
use uuid::Uuid;

use campus_types::api::{Claims, ChannelSummary, CreateChannelRequest, CreateChannelResponse};
use campus_types::models::ChannelKind;

use crate::state::AppState;

pub async fn create_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    // Announcement and emergency channels are staff-created
    if req.kind != ChannelKind::Direct && !claims.role.is_privileged() {
        return Err(StatusCode::FORBIDDEN);
    }

    let channel_id = Uuid::new_v4();
    let db = state.db.clone();
    let kind = req.kind;
    let mut members = req.participant_ids;
    if !members.contains(&claims.sub) {
        members.push(claims.sub);
    }

    tokio::task::spawn_blocking(move || {
        let cid = channel_id.to_string();
        db.create_channel(&cid, kind)?;
        for member in &members {
            db.add_channel_member(&cid, &member.to_string())?;
        }
        Ok::<_, anyhow::Error>(())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((StatusCode::CREATED, Json(CreateChannelResponse { channel_id })))
}

pub async fn get_channels(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let uid = claims.sub.to_string();

    let rows = tokio::task::spawn_blocking(move || db.channels_for_user(&uid))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let channels: Vec<ChannelSummary> = rows
        .into_iter()
        .filter_map(|(id, kind)| {
            let id = match id.parse::<Uuid>() {
                Ok(id) => id,
                Err(e) => {
                    warn!("Corrupt channel id '{}': {}", id, e);
                    return None;
                }
            };
            let kind = match kind.as_str() {
                "direct" => ChannelKind::Direct,
                "class_announcement" => ChannelKind::ClassAnnouncement,
                "emergency" => ChannelKind::Emergency,
                other => {
                    warn!("Unknown channel kind '{}' on {}", other, id);
                    return None;
                }
            };
            Some(ChannelSummary { id, kind })
        })
        .collect();

    Ok(Json(channels))
}
