use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/queue/stats
pub async fn get_queue_stats(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let stats = state.queue.get_job_stats().await;
    Ok(Json(DataResponse::new(stats)))
}
