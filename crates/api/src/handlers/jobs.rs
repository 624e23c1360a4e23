//! Handlers for the `/jobs` and `/uploads/{id}/...` resources.
//!
//! Uploads are stored by an outer layer before submission; a submit request
//! names the stored file under `UPLOAD_DIR` instead of carrying the bytes.

use std::path::{Component, Path as FsPath, PathBuf};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use wmpro_core::job::EnqueueRequest;
use wmpro_core::types::{JobId, UploadGroupId};
use wmpro_core::watermark::{JobPayload, WatermarkSpec};
use wmpro_queue::{ArchiveRequest, ArchiveSummary};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Status reported by the submit endpoint; the job may already be active.
const SUBMIT_STATUS: &str = "queued";

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    #[serde(default)]
    pub id: Option<JobId>,
    pub upload_group_id: UploadGroupId,
    /// Original client-side file name.
    pub filename: String,
    /// Name of the stored upload inside `UPLOAD_DIR`.
    pub stored_name: String,
    pub payload: JobPayload,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: JobId,
    pub upload_group_id: UploadGroupId,
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitArchiveRequest {
    /// Name of the stored ZIP inside `UPLOAD_DIR`.
    pub stored_name: String,
    pub watermark: WatermarkSpec,
    #[serde(default)]
    pub priority: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitArchiveResponse {
    pub upload_group_id: UploadGroupId,
    #[serde(flatten)]
    pub summary: ArchiveSummary,
}

#[derive(Debug, Serialize)]
pub struct RemoveJobResponse {
    pub removed: bool,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolve `stored_name` inside `upload_dir`, refusing anything but a plain
/// file name.
fn resolve_upload(upload_dir: &FsPath, stored_name: &str) -> AppResult<PathBuf> {
    let mut components = FsPath::new(stored_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(upload_dir.join(stored_name)),
        _ => Err(AppError::BadRequest(format!(
            "storedName must be a plain file name, got '{stored_name}'"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Returns 202 as soon as the job is recorded; processing happens in the
/// background and is reported over the WebSocket.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(body): Json<SubmitJobRequest>,
) -> AppResult<impl IntoResponse> {
    let input_path = resolve_upload(&state.config.upload_dir, &body.stored_name)?;
    let metadata = tokio::fs::metadata(&input_path).await.map_err(|_| {
        AppError::BadRequest(format!("Upload '{}' does not exist", body.stored_name))
    })?;
    if !metadata.is_file() {
        return Err(AppError::BadRequest(format!(
            "Upload '{}' is not a file",
            body.stored_name
        )));
    }

    let mut request = EnqueueRequest::new(
        body.upload_group_id.clone(),
        body.filename,
        input_path,
        body.payload,
    )
    .with_file_size(metadata.len());
    if let Some(id) = body.id {
        request = request.with_id(id);
    }
    if let Some(priority) = body.priority {
        request = request.with_priority(priority);
    }
    if let Some(max_attempts) = body.max_attempts {
        request = request.with_max_attempts(max_attempts);
    }

    let job_id = state.queue.enqueue(request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse::new(SubmitJobResponse {
            job_id,
            upload_group_id: body.upload_group_id,
            status: SUBMIT_STATUS,
        })),
    ))
}

/// POST /api/v1/uploads/{id}/archive
///
/// Unpacks a stored ZIP next to the other uploads and submits one job per
/// supported entry under the path's upload group.
pub async fn submit_archive(
    State(state): State<AppState>,
    Path(upload_group_id): Path<UploadGroupId>,
    Json(body): Json<SubmitArchiveRequest>,
) -> AppResult<impl IntoResponse> {
    let archive_path = resolve_upload(&state.config.upload_dir, &body.stored_name)?;
    if !tokio::fs::try_exists(&archive_path).await.unwrap_or(false) {
        return Err(AppError::BadRequest(format!(
            "Upload '{}' does not exist",
            body.stored_name
        )));
    }

    let summary = state
        .queue
        .enqueue_archive(ArchiveRequest {
            upload_group_id: upload_group_id.clone(),
            archive_path,
            extract_dir: state.config.upload_dir.clone(),
            watermark: body.watermark,
            priority: body.priority,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse::new(SubmitArchiveResponse {
            upload_group_id,
            summary,
        })),
    ))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.queue.get_job(&id).await?;
    Ok(Json(DataResponse::new(job)))
}

/// GET /api/v1/jobs/active
pub async fn list_active_jobs(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let jobs = state.queue.get_active_jobs().await;
    Ok(Json(DataResponse::new(jobs)))
}

/// GET /api/v1/uploads/{id}/jobs
pub async fn list_upload_jobs(
    State(state): State<AppState>,
    Path(upload_group_id): Path<UploadGroupId>,
) -> AppResult<impl IntoResponse> {
    let jobs = state.queue.get_jobs_by_upload_id(&upload_group_id).await;
    Ok(Json(DataResponse::new(jobs)))
}

// ---------------------------------------------------------------------------
// Removal
// ---------------------------------------------------------------------------

/// DELETE /api/v1/jobs/{id}
///
/// Idempotent: a second call reports `removed: false`.
pub async fn remove_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let removed = state.queue.remove_job(&id).await?;
    Ok(Json(DataResponse::new(RemoveJobResponse { removed })))
}
