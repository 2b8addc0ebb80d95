use axum::extract::{Path, State};
use axum::Json;

use crate::app_state::AppState;
use crate::messaging::reply::JobReplyMessage;
use crate::routes::ApiError;

/// GET /api/v1/diagnostics/replies/{correlation_id} — the last reply
/// recorded for a correlation token. Serves the in-memory store only;
/// entries disappear on restart.
pub async fn last_reply(
    State(state): State<AppState>,
    Path(correlation_id): Path<String>,
) -> Result<Json<JobReplyMessage>, ApiError> {
    state
        .correlations
        .get(&correlation_id)
        .map(Json)
        .ok_or(ApiError::NotFound("Reply"))
}
