use axum::{Extension, Json, extract::State, response::IntoResponse};

use campus_moderation::analyze_content;
use campus_types::api::{AnalyzeRequest, Claims};

use crate::state::AppState;

/// Advisory analysis for the message composer. Pure and synchronous; the
/// caller debounces, the server just scores.
pub async fn analyze(
    State(_state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<AnalyzeRequest>,
) -> impl IntoResponse {
    Json(analyze_content(&req.content))
}
