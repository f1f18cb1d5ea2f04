use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;

use campus_types::api::{Claims, CreateIncidentRequest, CreateIncidentResponse};
use campus_types::error::RealtimeError;

use campus_gateway::pipeline;

use crate::state::AppState;

/// Declare an emergency incident. Privileged roles only; the relay reaches
/// every live privileged session and a durable inbox entry per admin covers
/// the offline ones.
pub async fn create_incident(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateIncidentRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if !claims.role.is_privileged() {
        return Err(StatusCode::FORBIDDEN);
    }

    let (incident, delivered) = pipeline::submit_incident(
        &state.hub,
        &state.store(),
        &req.incident_type,
        &req.description,
        req.severity,
    )
    .await
    .map_err(|e| match e {
        RealtimeError::Validation(_) => StatusCode::BAD_REQUEST,
        other => {
            error!("Incident relay failed: {}", other);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    })?;

    Ok((
        StatusCode::CREATED,
        Json(CreateIncidentResponse {
            incident,
            delivered,
        }),
    ))
}
