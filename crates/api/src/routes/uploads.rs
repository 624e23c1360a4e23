use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/uploads`.
///
/// ```text
/// GET    /{id}/jobs       -> list_upload_jobs
/// POST   /{id}/archive    -> submit_archive
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/jobs", get(jobs::list_upload_jobs))
        .route("/{id}/archive", post(jobs::submit_archive))
}
