use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::ingest::{self, StartError};
use crate::models::{DeltaRequest, IngestJob, IngestRequest, JobAccepted};
use crate::state::AppState;

fn start_error(e: StartError) -> (StatusCode, String) {
    let status = match &e {
        StartError::Invalid(_) => StatusCode::BAD_REQUEST,
        StartError::UnknownRepo(_) => StatusCode::NOT_FOUND,
        StartError::Busy(_) => StatusCode::CONFLICT,
    };
    (status, e.to_string())
}

/// POST /api/ingest - Queue a full ingestion; poll the returned job id
pub async fn start_ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), (StatusCode, String)> {
    let job_id = ingest::start_ingest(&state, &req).map_err(start_error)?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}

/// POST /api/repos/{owner}/{name}/delta - Queue an incremental update
pub async fn start_delta(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
    Json(req): Json<DeltaRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), (StatusCode, String)> {
    let repo = super::repo_from_path(&owner, &name)?;
    let job_id = ingest::start_delta(&state, &repo, &req).map_err(start_error)?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<IngestJob>, (StatusCode, String)> {
    state
        .jobs
        .get(id)
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Unknown job {id}")))
}
