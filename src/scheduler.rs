//! # Sync Scheduler
//!
//! Background task that drives the sync job state machine. Each tick runs
//! three phases against the database, which is the only coordination point:
//!
//! 1. sweep: running rows whose attempt missed its deadline go back to
//!    pending, so a crashed worker never strands a job
//! 2. revive: terminal rows whose cadence or backoff has elapsed go back to
//!    pending
//! 3. admit: pending rows are claimed into running, in priority order,
//!    within the global and per-source concurrency caps
//!
//! Every transition is a compare-and-set on the current status, so several
//! scheduler instances can share one database without double-running a job.

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge, histogram};
use rand::Rng;
use sea_orm::{DatabaseConnection, DbErr};
use tokio::time::{Duration as TokioDuration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{RetryPolicyConfig, SchedulerConfig};
use crate::executor::{SyncErrorKind, SyncExecutor};
use crate::models::sync_job::{Model as SyncJob, SyncStatus};
use crate::repositories::{JobUpdate, SyncJobRepository};

/// Background scheduler service.
pub struct SyncScheduler {
    jobs: SyncJobRepository,
    executor: SyncExecutor,
    scheduler: SchedulerConfig,
    retry: RetryPolicyConfig,
}

#[derive(Debug, Default)]
struct TickStats {
    swept: u64,
    revived: u64,
    admitted: u64,
    skipped_at_cap: u64,
    parked: u64,
}

impl SyncScheduler {
    pub fn new(
        db: DatabaseConnection,
        executor: SyncExecutor,
        scheduler: SchedulerConfig,
        retry: RetryPolicyConfig,
    ) -> Self {
        Self {
            jobs: SyncJobRepository::new(db),
            executor,
            scheduler,
            retry,
        }
    }

    /// Run the scheduler loop until the provided shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            tick_seconds = self.scheduler.tick_interval_seconds,
            max_concurrency = self.scheduler.max_concurrency,
            per_source = self.scheduler.per_source_concurrency,
            "Starting sync scheduler"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Sync scheduler shutdown requested");
                    break;
                }
                _ = sleep(self.jittered_tick()) => {
                    let tick_started = Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = ?err, "Scheduler tick failed");
                    }
                    histogram!("sync_scheduler_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Sync scheduler stopped");
    }

    /// Tick interval with up to 10% jitter so co-located instances drift
    /// apart instead of thundering together.
    fn jittered_tick(&self) -> TokioDuration {
        let base_ms = self.scheduler.tick_interval_seconds * 1_000;
        let jitter_ms = rand::thread_rng().gen_range(0..=base_ms / 10);
        TokioDuration::from_millis(base_ms + jitter_ms)
    }

    pub async fn tick(&self) -> Result<(), DbErr> {
        let now = Utc::now();
        let mut stats = TickStats::default();

        self.sweep(now, &mut stats).await?;
        self.revive(&mut stats).await?;
        self.admit(&mut stats).await?;

        debug!(
            swept = stats.swept,
            revived = stats.revived,
            admitted = stats.admitted,
            skipped_at_cap = stats.skipped_at_cap,
            parked = stats.parked,
            "Scheduler tick completed"
        );

        Ok(())
    }

    /// Phase 1: requeue running jobs whose worker has evidently died.
    async fn sweep(&self, now: DateTime<Utc>, stats: &mut TickStats) -> Result<(), DbErr> {
        let grace = Duration::seconds(
            (self.scheduler.stale_running_factor as i64)
                * self.scheduler.attempt_timeout_seconds as i64,
        );
        let deadline = (now - grace).fixed_offset();

        stats.swept = self.jobs.sweep_stale_running(deadline).await?;
        if stats.swept > 0 {
            counter!("sync_jobs_swept_total").increment(stats.swept);
        }
        Ok(())
    }

    /// Phase 2: return terminal jobs to the queue once due.
    async fn revive(&self, stats: &mut TickStats) -> Result<(), DbErr> {
        for job in self.jobs.list_terminal().await? {
            match revival_due_at(&job, &self.retry) {
                Revival::Due(expected) => {
                    let revived = self
                        .jobs
                        .compare_and_set_status(
                            job.id,
                            expected,
                            SyncStatus::Pending,
                            JobUpdate::default(),
                        )
                        .await?;
                    if revived {
                        stats.revived += 1;
                        counter!("sync_jobs_revived_total", "from" => expected.as_str())
                            .increment(1);
                    }
                }
                Revival::NotBefore(_) => {}
                Revival::Parked => {
                    stats.parked += 1;
                }
            }
        }

        gauge!("sync_jobs_parked").set(stats.parked as f64);
        Ok(())
    }

    /// Phase 3: claim pending jobs into running, respecting both caps.
    async fn admit(&self, stats: &mut TickStats) -> Result<(), DbErr> {
        let mut per_source = self.jobs.count_running_by_source().await?;
        let mut running: usize = per_source.values().sum();
        gauge!("sync_jobs_running").set(running as f64);

        if running >= self.scheduler.max_concurrency {
            return Ok(());
        }

        let batch = (self.scheduler.max_concurrency as u64).saturating_mul(4);
        for job in self.jobs.list_pending(batch).await? {
            if running >= self.scheduler.max_concurrency {
                break;
            }
            let source_running = per_source.get(&job.source).copied().unwrap_or(0);
            if source_running >= self.scheduler.per_source_concurrency {
                stats.skipped_at_cap += 1;
                continue;
            }

            let claimed = self
                .jobs
                .compare_and_set_status(
                    job.id,
                    SyncStatus::Pending,
                    SyncStatus::Running,
                    JobUpdate::default(),
                )
                .await?;
            if !claimed {
                // Another instance admitted it between list and claim.
                continue;
            }

            running += 1;
            *per_source.entry(job.source).or_insert(0) += 1;
            stats.admitted += 1;
            counter!("sync_jobs_admitted_total", "source" => job.source.as_str()).increment(1);

            let executor = self.executor.clone();
            let claimed_job = SyncJob {
                status: SyncStatus::Running,
                ..job
            };
            tokio::spawn(async move {
                if let Err(err) = executor.execute(claimed_job).await {
                    warn!(error = ?err, "Sync attempt aborted on database error");
                }
            });
        }

        Ok(())
    }
}

/// Outcome of the revival computation for one terminal job.
#[derive(Debug, Clone, PartialEq)]
enum Revival {
    /// Transition back to pending now, from the given terminal state.
    Due(SyncStatus),
    /// Not yet; eligible at the given instant.
    NotBefore(DateTime<Utc>),
    /// Out of automatic retries; only a manual refresh revives it.
    Parked,
}

/// Decide what the scheduler should do with a terminal job at `Utc::now()`.
///
/// A missing `last_synced` means the job has never finished an attempt (the
/// manual refresh sentinel) and is treated as immediately overdue.
fn revival_due_at(job: &SyncJob, retry: &RetryPolicyConfig) -> Revival {
    let Some(last_synced) = job.last_synced else {
        return Revival::Due(job.status);
    };
    let last_synced = last_synced.with_timezone(&Utc);

    match job.status {
        SyncStatus::Success => {
            let due = last_synced + job.sync_interval.duration();
            if Utc::now() >= due {
                Revival::Due(SyncStatus::Success)
            } else {
                Revival::NotBefore(due)
            }
        }
        SyncStatus::Failed => {
            let kind = job
                .sync_error
                .as_deref()
                .map(SyncErrorKind::parse)
                .unwrap_or(SyncErrorKind::AdapterUnavailable);

            if job.attempt_count >= attempt_cap(kind, retry) {
                return Revival::Parked;
            }

            let due = last_synced + backoff_delay(kind, job.attempt_count, retry);
            if Utc::now() >= due {
                Revival::Due(SyncStatus::Failed)
            } else {
                Revival::NotBefore(due)
            }
        }
        // list_terminal never returns these.
        SyncStatus::Pending | SyncStatus::Running => Revival::Parked,
    }
}

/// Attempts allowed before a job parks, by failure kind. Jobs whose entity
/// vanished upstream give up sooner; the rest share one cap.
fn attempt_cap(kind: SyncErrorKind, retry: &RetryPolicyConfig) -> i32 {
    match kind {
        SyncErrorKind::NotFoundUpstream => retry.not_found_max_attempts,
        _ => retry.max_attempts,
    }
}

/// Delay before attempt `attempts_completed + 1`, by failure kind.
///
/// Rate-limited failures start from a widened base, mapping failures wait a
/// fixed long delay since they signal a provider format change rather than
/// a transient fault, and everything else follows the plain exponential
/// curve capped at the configured ceiling.
fn backoff_delay(kind: SyncErrorKind, attempts_completed: i32, retry: &RetryPolicyConfig) -> Duration {
    if kind == SyncErrorKind::MappingError {
        return Duration::seconds(retry.mapping_error_delay_seconds as i64);
    }

    let base = match kind {
        SyncErrorKind::RateLimited => {
            retry.backoff_base_seconds * retry.rate_limited_multiplier as u64
        }
        _ => retry.backoff_base_seconds,
    };

    let exponent = attempts_completed.saturating_sub(1).clamp(0, 32) as u32;
    let delay = base
        .saturating_mul(1u64 << exponent)
        .min(retry.backoff_cap_seconds);

    Duration::seconds(delay as i64)
}
