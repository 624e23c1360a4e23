//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// POST   /                -> submit_job
/// GET    /active          -> list_active_jobs
/// GET    /{id}            -> get_job
/// DELETE /{id}            -> remove_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(jobs::submit_job))
        .route("/active", get(jobs::list_active_jobs))
        .route("/{id}", get(jobs::get_job).delete(jobs::remove_job))
}
