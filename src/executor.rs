//! Sync Executor
//!
//! Runs one claimed sync attempt end to end: fetch the payload through the
//! source adapter, link it into a mentor profile, and settle the job into a
//! terminal state. The executor only ever moves jobs out of `running`; a
//! lost compare-and-set means the stale sweep reclaimed the attempt and the
//! outcome must be discarded.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, histogram};
use sea_orm::{DatabaseConnection, DbErr};
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

use crate::adapters::{AdapterError, AdapterRegistry};
use crate::linker::{LinkError, MentorLinker, ProfileLinker};
use crate::models::sync_job::{Model as SyncJob, SyncStatus};
use crate::repositories::{JobUpdate, SyncJobRepository};

/// Failure classification persisted with the job and read back by the
/// scheduler to pick a backoff curve. Stored as the prefix of `sync_error`,
/// so the variants double as a tiny wire format.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncErrorKind {
    /// Provider unreachable or returned a server error.
    AdapterUnavailable,
    /// Provider asked us to slow down.
    RateLimited,
    /// The source id no longer exists upstream.
    NotFoundUpstream,
    /// The attempt overran its deadline.
    Timeout,
    /// Payload arrived but could not be mapped to a profile.
    MappingError,
}

impl SyncErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncErrorKind::AdapterUnavailable => "AdapterUnavailable",
            SyncErrorKind::RateLimited => "RateLimited",
            SyncErrorKind::NotFoundUpstream => "NotFoundUpstream",
            SyncErrorKind::Timeout => "Timeout",
            SyncErrorKind::MappingError => "MappingError",
        }
    }

    /// Recover the kind from a stored `sync_error` string. Unknown or
    /// malformed prefixes fall back to `AdapterUnavailable`, the most
    /// conservative retry curve.
    pub fn parse(sync_error: &str) -> SyncErrorKind {
        let prefix = sync_error.split(':').next().unwrap_or("").trim();
        match prefix {
            "AdapterUnavailable" => SyncErrorKind::AdapterUnavailable,
            "RateLimited" => SyncErrorKind::RateLimited,
            "NotFoundUpstream" => SyncErrorKind::NotFoundUpstream,
            "Timeout" => SyncErrorKind::Timeout,
            "MappingError" => SyncErrorKind::MappingError,
            _ => SyncErrorKind::AdapterUnavailable,
        }
    }
}

impl std::fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executes individual sync attempts for jobs already claimed as running.
#[derive(Clone)]
pub struct SyncExecutor {
    jobs: SyncJobRepository,
    adapters: Arc<AdapterRegistry>,
    linker: Arc<dyn ProfileLinker>,
    attempt_timeout: Duration,
}

impl SyncExecutor {
    pub fn new(
        db: DatabaseConnection,
        adapters: Arc<AdapterRegistry>,
        attempt_timeout: Duration,
    ) -> Self {
        let linker = Arc::new(MentorLinker::new(db.clone()));
        Self::with_linker(db, adapters, linker, attempt_timeout)
    }

    pub fn with_linker(
        db: DatabaseConnection,
        adapters: Arc<AdapterRegistry>,
        linker: Arc<dyn ProfileLinker>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            jobs: SyncJobRepository::new(db),
            adapters,
            linker,
            attempt_timeout,
        }
    }

    /// Run one attempt for `job`, which must already be in `running`.
    #[instrument(skip(self, job), fields(job_id = %job.id, source = %job.source, source_id = %job.source_id))]
    pub async fn execute(&self, job: SyncJob) -> Result<(), DbErr> {
        let started = std::time::Instant::now();
        debug!(attempt = job.attempt_count + 1, "Sync attempt starting");

        let outcome = self.attempt(&job).await;
        histogram!("sync_attempt_duration_seconds", "source" => job.source.as_str())
            .record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(Outcome::Linked { mentor_id, raw }) => {
                self.settle_success(&job, mentor_id, raw).await
            }
            Ok(Outcome::Failed { kind, message }) => {
                self.settle_failure(&job, kind, &message).await
            }
            Err(db_err) => Err(db_err),
        }
    }

    /// Fetch and link under one deadline. Database errors propagate;
    /// everything else collapses into a classified failure.
    async fn attempt(&self, job: &SyncJob) -> Result<Outcome, DbErr> {
        let adapter = match self.adapters.get(job.source) {
            Ok(adapter) => adapter,
            Err(err) => {
                return Ok(Outcome::Failed {
                    kind: SyncErrorKind::AdapterUnavailable,
                    message: err.to_string(),
                });
            }
        };

        // The deadline covers the whole attempt: the provider round trip and
        // the profile write. A stalled write must not hold the job in
        // running until the stale sweep notices.
        let fetch_and_link = async {
            let raw = match adapter.fetch(&job.source_id).await {
                Ok(raw) => raw,
                Err(adapter_err) => {
                    let (kind, message) = classify_adapter_error(&adapter_err);
                    return Ok(Outcome::Failed { kind, message });
                }
            };

            match self.linker.link(job, &raw).await {
                Ok(mentor_id) => Ok(Outcome::Linked { mentor_id, raw }),
                Err(LinkError::Database(db_err)) => Err(db_err),
                Err(link_err) => Ok(Outcome::Failed {
                    kind: SyncErrorKind::MappingError,
                    message: link_err.to_string(),
                }),
            }
        };

        match tokio::time::timeout(self.attempt_timeout, fetch_and_link).await {
            Ok(outcome) => outcome,
            Err(_elapsed) => Ok(Outcome::Failed {
                kind: SyncErrorKind::Timeout,
                message: format!(
                    "attempt exceeded {}s deadline",
                    self.attempt_timeout.as_secs()
                ),
            }),
        }
    }

    async fn settle_success(
        &self,
        job: &SyncJob,
        mentor_id: uuid::Uuid,
        raw: JsonValue,
    ) -> Result<(), DbErr> {
        let settled = self
            .jobs
            .compare_and_set_status(
                job.id,
                SyncStatus::Running,
                SyncStatus::Success,
                JobUpdate {
                    last_synced: Some(Utc::now().fixed_offset()),
                    raw_data: Some(raw),
                    clear_sync_error: true,
                    attempt_count: Some(0),
                    mentor_id: Some(mentor_id),
                    ..Default::default()
                },
            )
            .await?;

        if settled {
            counter!("sync_jobs_completed_total", "source" => job.source.as_str()).increment(1);
            info!(mentor_id = %mentor_id, "Sync attempt succeeded");
        } else {
            // A profile created by this attempt has no job pointing at it;
            // the retry will create its own.
            if job.mentor_id.is_none() {
                self.linker.discard(mentor_id).await?;
            }
            warn!("Successful attempt discarded, job was reclaimed mid-flight");
        }
        Ok(())
    }

    async fn settle_failure(
        &self,
        job: &SyncJob,
        kind: SyncErrorKind,
        message: &str,
    ) -> Result<(), DbErr> {
        let settled = self
            .jobs
            .compare_and_set_status(
                job.id,
                SyncStatus::Running,
                SyncStatus::Failed,
                JobUpdate {
                    last_synced: Some(Utc::now().fixed_offset()),
                    sync_error: Some(format!("{kind}: {message}")),
                    increment_attempts: true,
                    ..Default::default()
                },
            )
            .await?;

        if settled {
            counter!(
                "sync_jobs_failed_total",
                "source" => job.source.as_str(),
                "kind" => kind.as_str()
            )
            .increment(1);
            warn!(
                kind = %kind,
                attempt = job.attempt_count + 1,
                "Sync attempt failed: {message}"
            );
        } else {
            warn!("Failed attempt discarded, job was reclaimed mid-flight");
        }
        Ok(())
    }
}

enum Outcome {
    Linked {
        mentor_id: uuid::Uuid,
        raw: JsonValue,
    },
    Failed {
        kind: SyncErrorKind,
        message: String,
    },
}

fn classify_adapter_error(err: &AdapterError) -> (SyncErrorKind, String) {
    match err {
        AdapterError::Unavailable { details } => {
            (SyncErrorKind::AdapterUnavailable, details.clone())
        }
        AdapterError::RateLimited { retry_after_secs } => {
            let message = match retry_after_secs {
                Some(secs) => format!("upstream asked to retry after {secs}s"),
                None => "upstream rate limited the request".to_string(),
            };
            (SyncErrorKind::RateLimited, message)
        }
        AdapterError::NotFoundUpstream => (
            SyncErrorKind::NotFoundUpstream,
            "entity no longer exists upstream".to_string(),
        ),
    }
}
