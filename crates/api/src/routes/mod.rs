pub mod health;
pub mod jobs;
pub mod queue;
pub mod uploads;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs                          submit (POST)
/// /jobs/active                   active jobs (GET)
/// /jobs/{id}                     get, remove
///
/// /queue/stats                   aggregate counters (GET)
///
/// /uploads/{id}/jobs             jobs of one upload group (GET)
/// /uploads/{id}/archive          ZIP batch submission (POST)
/// ```
///
/// The WebSocket endpoint is mounted at `/ws` by the app router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/queue", queue::router())
        .nest("/uploads", uploads::router())
}
