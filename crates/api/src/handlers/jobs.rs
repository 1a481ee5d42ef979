//! Handlers for the `/jobs` resource.
//!
//! Clients submit and poll jobs by session id. Converter workers claim
//! admitted jobs and report progress and outcomes against the same session
//! id, quoting the claimed job id so a late report cannot touch a newer job.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use markswift_core::error::CoreError;
use markswift_core::job::{JobOutcome, JobStatus};
use markswift_core::types::JobId;
use markswift_events::Notification;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

/// Body of `POST /jobs`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJob {
    #[validate(length(min = 1, max = 128))]
    pub session_id: String,
    /// Upload batches are capped at 100 files.
    #[validate(range(min = 1, max = 100))]
    pub file_count: u32,
}

/// Body of `POST /jobs/{session_id}/progress`: a progress notification
/// tagged with the claimed job id.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportProgress {
    pub job_id: JobId,
    #[serde(flatten)]
    pub message: Notification,
}

/// Body of `POST /jobs/{session_id}/complete`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCompletion {
    pub job_id: JobId,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

#[derive(Debug, Serialize)]
pub struct ProgressAck {
    pub delivered: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionAck {
    pub job_id: JobId,
    pub status: JobStatus,
}

// ---------------------------------------------------------------------------
// Client-facing
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Enqueue a conversion job for a session. Returns 201 with the job as
/// enqueued; 409 if the session already has a live job.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJob>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let ticket = state.queue.submit(input.session_id, input.file_count).await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: ticket.job })))
}

/// GET /api/v1/jobs/{session_id}
///
/// Current record of the session's queued or running job.
pub async fn get_job(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job = state
        .queue
        .status_of(&session_id)
        .await
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job for session",
            id: session_id,
        }))?;

    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Converter-facing
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/claim
///
/// Long-poll for the next admitted job. Returns 200 with the job, or 204
/// when none became available within the claim window.
pub async fn claim_job(State(state): State<AppState>) -> AppResult<Response> {
    match state.claims.claim(state.config.claim_wait).await {
        Some(claimed) => Ok(Json(DataResponse { data: claimed }).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// POST /api/v1/jobs/{session_id}/progress
///
/// Relay a `status`, `file_status`, or `file_complete` message to the
/// session. `delivered` is false when the session has no open socket.
pub async fn report_progress(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(input): Json<ReportProgress>,
) -> AppResult<impl IntoResponse> {
    if !input.message.is_progress() {
        return Err(AppError::BadRequest(format!(
            "'{}' is not a progress message",
            input.message.kind()
        )));
    }

    let delivered = state
        .claims
        .progress(&session_id, input.job_id, input.message)
        .await
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Claimed job",
            id: input.job_id.to_string(),
        }))?;

    Ok(Json(DataResponse {
        data: ProgressAck { delivered },
    }))
}

/// POST /api/v1/jobs/{session_id}/complete
///
/// Report the terminal outcome of a claimed job, freeing its slot. Returns
/// 404 once the job no longer holds its slot (e.g. the timeout watchdog
/// failed it), or 409 if that happened while this report was in flight.
pub async fn complete_job(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(input): Json<ReportCompletion>,
) -> AppResult<impl IntoResponse> {
    let reporter = state
        .claims
        .take(&session_id, input.job_id)
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Claimed job",
            id: input.job_id.to_string(),
        }))?;

    let status = input.outcome.status();
    if !reporter.finish(input.outcome).await {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Job {} is no longer processing",
            input.job_id
        ))));
    }

    tracing::info!(
        job_id = %input.job_id,
        session_id = %session_id,
        status = %status,
        "Converter reported job outcome",
    );

    Ok(Json(DataResponse {
        data: CompletionAck {
            job_id: input.job_id,
            status,
        },
    }))
}
