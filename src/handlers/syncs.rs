//! # Artist Sync API Handlers
//!
//! Handlers for the /api/artist-syncs surface: enqueue a job, list and
//! inspect jobs, and force an out-of-band refresh.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{
    ApiError, already_in_flight, duplicate_key, job_not_found, validation_error,
};
use crate::models::sync_job::{Model as SyncJob, SyncInterval, SyncSource, SyncStatus};
use crate::repositories::{JobFilter, JobUpdate, NewSyncJob, SyncJobRepository};
use crate::server::AppState;

/// Request payload for enqueueing a sync job
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    /// Provider to pull from
    #[schema(example = "spotify")]
    pub source: SyncSource,
    /// Provider-specific identifier for the artist
    #[schema(example = "7G1GBhoKtEPnP86X2PvEYO")]
    pub source_id: String,
    /// Re-sync cadence after each completed attempt
    #[schema(example = "daily")]
    pub sync_interval: SyncInterval,
    /// Scheduling priority, 1 (highest) to 10 (lowest); defaults to 5
    #[schema(example = 5)]
    pub priority: Option<i16>,
}

/// Sync job response shape consumed by the dashboard
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncJobResponse {
    /// Unique identifier for the sync job
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: Uuid,
    /// Provider this job pulls from
    pub source: SyncSource,
    /// Provider-specific identifier
    pub source_id: String,
    /// Linked mentor profile id, set on first successful sync
    pub mentor_id: Option<Uuid>,
    /// Current job status
    pub sync_status: SyncStatus,
    /// Scheduling priority
    pub priority: i16,
    /// Re-sync cadence
    pub sync_interval: SyncInterval,
    /// Finish time of the most recent attempt (RFC 3339)
    pub last_synced: Option<String>,
    /// Last failure message, present only while failed
    pub sync_error: Option<String>,
    /// Last successful payload, serialized as an opaque JSON string
    pub raw_data: Option<String>,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
}

impl From<SyncJob> for SyncJobResponse {
    fn from(model: SyncJob) -> Self {
        Self {
            id: model.id,
            source: model.source,
            source_id: model.source_id,
            mentor_id: model.mentor_id,
            sync_status: model.status,
            priority: model.priority,
            sync_interval: model.sync_interval,
            last_synced: model.last_synced.map(|dt| dt.to_rfc3339()),
            sync_error: model.sync_error,
            // Opaque to callers: a string, whatever shape the provider sent.
            raw_data: model.raw_data.map(|data| data.to_string()),
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// Query parameters for listing sync jobs
#[derive(Debug, Deserialize)]
pub struct ListSyncsQuery {
    /// Filter by job status (one of: pending, running, success, failed)
    pub status: Option<String>,
    /// Filter by source (one of: spotify, genius, lastfm)
    pub source: Option<String>,
}

/// Enqueue a sync job for an artist
#[utoipa::path(
    post,
    path = "/api/artist-syncs",
    request_body = EnqueueRequest,
    responses(
        (status = 200, description = "Job enqueued (or failed job re-adopted)", body = SyncJobResponse),
        (status = 400, description = "Invalid input", body = ApiError),
        (status = 409, description = "An active job already holds this key", body = ApiError)
    ),
    tag = "artist-syncs"
)]
pub async fn enqueue_sync(
    State(state): State<AppState>,
    payload: Result<Json<EnqueueRequest>, JsonRejection>,
) -> Result<Json<SyncJobResponse>, ApiError> {
    let Json(request) = payload?;

    let source_id = request.source_id.trim().to_string();
    if source_id.is_empty() {
        return Err(validation_error(
            "Invalid sourceId",
            serde_json::json!({ "sourceId": "Must be a non-empty string" }),
        ));
    }

    let priority = request.priority.unwrap_or(5);
    if !(1..=10).contains(&priority) {
        return Err(validation_error(
            "Invalid priority",
            serde_json::json!({ "priority": "Must be between 1 and 10" }),
        ));
    }

    let repo = SyncJobRepository::new(state.db.clone());

    // A failed job holding the key is re-adopted instead of duplicated.
    if let Some(existing) = repo.find_by_key(request.source, &source_id).await? {
        if existing.status != SyncStatus::Failed {
            return Err(duplicate_key(request.source.as_str(), &source_id));
        }

        let adopted = repo
            .compare_and_set_status(
                existing.id,
                SyncStatus::Failed,
                SyncStatus::Pending,
                JobUpdate {
                    attempt_count: Some(0),
                    clear_sync_error: true,
                    ..Default::default()
                },
            )
            .await?;
        if !adopted {
            // Raced with the scheduler or another enqueue; the key is active.
            return Err(duplicate_key(request.source.as_str(), &source_id));
        }

        let job = repo
            .find_by_id(existing.id)
            .await?
            .ok_or_else(|| job_not_found(existing.id))?;
        tracing::info!(job_id = %job.id, "Failed sync job re-adopted by enqueue");
        return Ok(Json(job.into()));
    }

    let job = repo
        .insert(NewSyncJob {
            source: request.source,
            source_id: source_id.clone(),
            priority,
            sync_interval: request.sync_interval,
        })
        .await
        .map_err(|err| {
            if crate::error::is_unique_violation(&err) {
                duplicate_key(request.source.as_str(), &source_id)
            } else {
                err.into()
            }
        })?;

    Ok(Json(job.into()))
}

/// List sync jobs with optional filters
#[utoipa::path(
    get,
    path = "/api/artist-syncs",
    params(
        ("status" = Option<String>, Query, description = "Filter by job status"),
        ("source" = Option<String>, Query, description = "Filter by source")
    ),
    responses(
        (status = 200, description = "Jobs matching the filters", body = [SyncJobResponse]),
        (status = 400, description = "Invalid filter value", body = ApiError)
    ),
    tag = "artist-syncs"
)]
pub async fn list_syncs(
    State(state): State<AppState>,
    Query(params): Query<ListSyncsQuery>,
) -> Result<Json<Vec<SyncJobResponse>>, ApiError> {
    let status = match params.status.as_deref() {
        None => None,
        Some("pending") => Some(SyncStatus::Pending),
        Some("running") => Some(SyncStatus::Running),
        Some("success") => Some(SyncStatus::Success),
        Some("failed") => Some(SyncStatus::Failed),
        Some(_) => {
            return Err(validation_error(
                "Invalid status",
                serde_json::json!({
                    "status": "Must be one of: pending, running, success, failed"
                }),
            ));
        }
    };

    let source = match params.source.as_deref() {
        None => None,
        Some("spotify") => Some(SyncSource::Spotify),
        Some("genius") => Some(SyncSource::Genius),
        Some("lastfm") => Some(SyncSource::Lastfm),
        Some(_) => {
            return Err(validation_error(
                "Invalid source",
                serde_json::json!({
                    "source": "Must be one of: spotify, genius, lastfm"
                }),
            ));
        }
    };

    let jobs = SyncJobRepository::new(state.db.clone())
        .list(JobFilter { status, source })
        .await?;

    Ok(Json(jobs.into_iter().map(SyncJobResponse::from).collect()))
}

/// Fetch a single sync job by id
#[utoipa::path(
    get,
    path = "/api/artist-syncs/{id}",
    params(
        ("id" = Uuid, Path, description = "Sync job identifier")
    ),
    responses(
        (status = 200, description = "The sync job", body = SyncJobResponse),
        (status = 404, description = "No job with this id", body = ApiError)
    ),
    tag = "artist-syncs"
)]
pub async fn get_sync(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SyncJobResponse>, ApiError> {
    let job = SyncJobRepository::new(state.db.clone())
        .find_by_id(id)
        .await?
        .ok_or_else(|| job_not_found(id))?;

    Ok(Json(job.into()))
}

/// Force an out-of-band refresh of a sync job
///
/// Resets the retry budget and clears `lastSynced`, which the scheduler
/// treats as overdue, so the job is admitted on the next tick. A job whose
/// attempt is mid-flight cannot be refreshed.
#[utoipa::path(
    post,
    path = "/api/artist-syncs/{id}/refresh",
    params(
        ("id" = Uuid, Path, description = "Sync job identifier")
    ),
    responses(
        (status = 202, description = "Refresh accepted", body = SyncJobResponse),
        (status = 404, description = "No job with this id", body = ApiError),
        (status = 409, description = "Job is currently running", body = ApiError)
    ),
    tag = "artist-syncs"
)]
pub async fn refresh_sync(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SyncJobResponse>), ApiError> {
    let repo = SyncJobRepository::new(state.db.clone());

    // The observed status is the CAS guard, so two passes cover one lost
    // race; after that the job is genuinely contended and we bail out.
    for _ in 0..2 {
        let job = repo.find_by_id(id).await?.ok_or_else(|| job_not_found(id))?;

        if job.status == SyncStatus::Running {
            return Err(already_in_flight(id));
        }

        let refreshed = repo
            .compare_and_set_status(
                id,
                job.status,
                SyncStatus::Pending,
                JobUpdate {
                    clear_last_synced: true,
                    attempt_count: Some(0),
                    clear_sync_error: true,
                    ..Default::default()
                },
            )
            .await?;

        if refreshed {
            tracing::info!(job_id = %id, "Manual refresh accepted");
            let job = repo.find_by_id(id).await?.ok_or_else(|| job_not_found(id))?;
            return Ok((StatusCode::ACCEPTED, Json(job.into())));
        }
    }

    Err(already_in_flight(id))
}
