//! # SyncJob Repository
//!
//! This module provides repository operations for the sync_jobs table,
//! encapsulating SeaORM operations behind the transitions the scheduler,
//! executor and handlers are allowed to make.
//!
//! The one primitive everything races through is [`compare_and_set_status`]:
//! an UPDATE filtered on both id and the expected current status. A caller
//! that observes `rows_affected == 0` lost the race and must not apply its
//! side effects.
//!
//! [`compare_and_set_status`]: SyncJobRepository::compare_and_set_status

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::sea_query::{Expr, NullOrdering, Order};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::sync_job::{
    ActiveModel, Column, Entity, Model, SyncInterval, SyncSource, SyncStatus,
};

/// Fields for a job being enqueued; everything else starts at its default.
#[derive(Debug, Clone)]
pub struct NewSyncJob {
    pub source: SyncSource,
    pub source_id: String,
    pub priority: i16,
    pub sync_interval: SyncInterval,
}

/// Optional column writes applied together with a status transition.
///
/// `updated_at` is always rewritten; it is the reference point for the
/// stale-running sweep.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub last_synced: Option<DateTimeWithTimeZone>,
    pub clear_last_synced: bool,
    pub sync_error: Option<String>,
    pub clear_sync_error: bool,
    pub raw_data: Option<JsonValue>,
    pub attempt_count: Option<i32>,
    pub increment_attempts: bool,
    pub mentor_id: Option<Uuid>,
}

/// Filters for listing jobs through the status API.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<SyncStatus>,
    pub source: Option<SyncSource>,
}

/// Repository for sync job database operations
#[derive(Clone)]
pub struct SyncJobRepository {
    db: DatabaseConnection,
}

impl SyncJobRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert a new pending job. A unique violation here means another row
    /// for the same (source, source_id) is already active; the caller maps
    /// that to a conflict.
    pub async fn insert(&self, new_job: NewSyncJob) -> Result<Model, DbErr> {
        let now = Utc::now().fixed_offset();

        let job = ActiveModel {
            id: Set(Uuid::new_v4()),
            source: Set(new_job.source),
            source_id: Set(new_job.source_id),
            mentor_id: Set(None),
            status: Set(SyncStatus::Pending),
            priority: Set(new_job.priority),
            sync_interval: Set(new_job.sync_interval),
            last_synced: Set(None),
            sync_error: Set(None),
            raw_data: Set(None),
            attempt_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let result = job.insert(&self.db).await?;

        tracing::info!(
            job_id = %result.id,
            source = %result.source,
            source_id = %result.source_id,
            priority = result.priority,
            "Sync job enqueued"
        );

        Ok(result)
    }

    pub async fn find_by_id(&self, job_id: Uuid) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(job_id).one(&self.db).await
    }

    /// Find the row holding a (source, source_id) key, if any.
    pub async fn find_by_key(
        &self,
        source: SyncSource,
        source_id: &str,
    ) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::Source.eq(source))
            .filter(Column::SourceId.eq(source_id))
            .one(&self.db)
            .await
    }

    /// List jobs with optional status/source filters, in admission order.
    pub async fn list(&self, filter: JobFilter) -> Result<Vec<Model>, DbErr> {
        let mut query = Entity::find()
            .order_by_asc(Column::Priority)
            .order_by_asc(Column::CreatedAt);

        if let Some(status) = filter.status {
            query = query.filter(Column::Status.eq(status));
        }
        if let Some(source) = filter.source {
            query = query.filter(Column::Source.eq(source));
        }

        query.all(&self.db).await
    }

    /// Pending jobs in admission order: priority first, then least recently
    /// synced, never-synced rows ahead of everything.
    pub async fn list_pending(&self, limit: u64) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::Status.eq(SyncStatus::Pending))
            .order_by_asc(Column::Priority)
            .order_by_with_nulls(Column::LastSynced, Order::Asc, NullOrdering::First)
            .order_by_asc(Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await
    }

    /// Jobs resting in a terminal state, candidates for revival.
    pub async fn list_terminal(&self) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::Status.is_in([SyncStatus::Success, SyncStatus::Failed]))
            .all(&self.db)
            .await
    }

    /// Atomically transition `job_id` from `expected` to `new_status`,
    /// applying `update` in the same statement. Returns false when the row
    /// was no longer in `expected`, in which case nothing was written.
    pub async fn compare_and_set_status(
        &self,
        job_id: Uuid,
        expected: SyncStatus,
        new_status: SyncStatus,
        update: JobUpdate,
    ) -> Result<bool, DbErr> {
        let now = Utc::now().fixed_offset();

        let mut stmt = Entity::update_many()
            .col_expr(Column::Status, Expr::value(new_status.as_str()))
            .col_expr(Column::UpdatedAt, Expr::value(now));

        if let Some(last_synced) = update.last_synced {
            stmt = stmt.col_expr(Column::LastSynced, Expr::value(last_synced));
        } else if update.clear_last_synced {
            stmt = stmt.col_expr(Column::LastSynced, Expr::value(None::<DateTimeWithTimeZone>));
        }

        if let Some(sync_error) = update.sync_error {
            stmt = stmt.col_expr(Column::SyncError, Expr::value(sync_error));
        } else if update.clear_sync_error {
            stmt = stmt.col_expr(Column::SyncError, Expr::value(None::<String>));
        }

        if let Some(raw_data) = update.raw_data {
            stmt = stmt.col_expr(Column::RawData, Expr::value(raw_data));
        }

        if let Some(attempt_count) = update.attempt_count {
            stmt = stmt.col_expr(Column::AttemptCount, Expr::value(attempt_count));
        } else if update.increment_attempts {
            stmt = stmt.col_expr(
                Column::AttemptCount,
                Expr::value(Expr::col(Column::AttemptCount).add(1)),
            );
        }

        if let Some(mentor_id) = update.mentor_id {
            stmt = stmt.col_expr(Column::MentorId, Expr::value(mentor_id));
        }

        let result = stmt
            .filter(Column::Id.eq(job_id))
            .filter(Column::Status.eq(expected))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            tracing::debug!(
                job_id = %job_id,
                expected = %expected,
                attempted = %new_status,
                "Status transition lost the race"
            );
        }

        Ok(result.rows_affected == 1)
    }

    /// Count of running jobs per source, used to rebuild the per-source
    /// concurrency picture at the start of each admission pass.
    pub async fn count_running_by_source(&self) -> Result<HashMap<SyncSource, usize>, DbErr> {
        let rows: Vec<(SyncSource, i64)> = Entity::find()
            .select_only()
            .column(Column::Source)
            .column_as(Column::Id.count(), "count")
            .filter(Column::Status.eq(SyncStatus::Running))
            .group_by(Column::Source)
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(source, count)| (source, count as usize))
            .collect())
    }

    /// Return crashed attempts to the queue: any running row not touched
    /// since `deadline` goes back to pending in a single UPDATE. Returns the
    /// number of rows swept.
    pub async fn sweep_stale_running(
        &self,
        deadline: DateTimeWithTimeZone,
    ) -> Result<u64, DbErr> {
        let now = Utc::now().fixed_offset();

        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(SyncStatus::Pending.as_str()))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Status.eq(SyncStatus::Running))
            .filter(Column::UpdatedAt.lt(deadline))
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            tracing::warn!(
                swept = result.rows_affected,
                "Requeued running jobs that missed their deadline"
            );
        }

        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    async fn test_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        db
    }

    fn spotify_job(source_id: &str) -> NewSyncJob {
        NewSyncJob {
            source: SyncSource::Spotify,
            source_id: source_id.to_string(),
            priority: 5,
            sync_interval: SyncInterval::Daily,
        }
    }

    #[tokio::test]
    async fn insert_and_find_round_trip() {
        let repo = SyncJobRepository::new(test_db().await);
        let created = repo.insert(spotify_job("artist-1")).await.unwrap();

        assert_eq!(created.status, SyncStatus::Pending);
        assert_eq!(created.attempt_count, 0);
        assert!(created.last_synced.is_none());

        let found = repo
            .find_by_key(SyncSource::Spotify, "artist-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn duplicate_active_key_rejected() {
        let repo = SyncJobRepository::new(test_db().await);
        repo.insert(spotify_job("artist-1")).await.unwrap();

        let err = repo.insert(spotify_job("artist-1")).await.unwrap_err();
        assert!(crate::error::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn same_source_id_across_sources_allowed() {
        let repo = SyncJobRepository::new(test_db().await);
        repo.insert(spotify_job("artist-1")).await.unwrap();
        repo.insert(NewSyncJob {
            source: SyncSource::Genius,
            source_id: "artist-1".to_string(),
            priority: 5,
            sync_interval: SyncInterval::Daily,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn concurrent_claims_have_a_single_winner() {
        // One pooled connection, so every task hits the same database and
        // the claims genuinely contend.
        let mut options = sea_orm::ConnectOptions::new("sqlite::memory:".to_owned());
        options.max_connections(1);
        let db = Database::connect(options).await.unwrap();
        Migrator::up(&db, None).await.unwrap();

        let repo = SyncJobRepository::new(db);
        let job = repo.insert(spotify_job("artist-1")).await.unwrap();

        let mut claims = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            let id = job.id;
            claims.push(tokio::spawn(async move {
                repo.compare_and_set_status(
                    id,
                    SyncStatus::Pending,
                    SyncStatus::Running,
                    JobUpdate::default(),
                )
                .await
                .unwrap()
            }));
        }

        let mut winners = 0;
        for claim in claims {
            if claim.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        let current = repo.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(current.status, SyncStatus::Running);
    }

    #[tokio::test]
    async fn compare_and_set_is_exclusive() {
        let repo = SyncJobRepository::new(test_db().await);
        let job = repo.insert(spotify_job("artist-1")).await.unwrap();

        let won = repo
            .compare_and_set_status(
                job.id,
                SyncStatus::Pending,
                SyncStatus::Running,
                JobUpdate::default(),
            )
            .await
            .unwrap();
        assert!(won);

        // Second claim observes running, not pending.
        let won_again = repo
            .compare_and_set_status(
                job.id,
                SyncStatus::Pending,
                SyncStatus::Running,
                JobUpdate::default(),
            )
            .await
            .unwrap();
        assert!(!won_again);

        let current = repo.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(current.status, SyncStatus::Running);
    }

    #[tokio::test]
    async fn cas_applies_update_fields() {
        let repo = SyncJobRepository::new(test_db().await);
        let job = repo.insert(spotify_job("artist-1")).await.unwrap();
        let now = Utc::now().fixed_offset();
        let mentor_id = Uuid::new_v4();

        repo.compare_and_set_status(
            job.id,
            SyncStatus::Pending,
            SyncStatus::Running,
            JobUpdate::default(),
        )
        .await
        .unwrap();

        let won = repo
            .compare_and_set_status(
                job.id,
                SyncStatus::Running,
                SyncStatus::Success,
                JobUpdate {
                    last_synced: Some(now),
                    raw_data: Some(serde_json::json!({"name": "Nina Simone"})),
                    clear_sync_error: true,
                    attempt_count: Some(0),
                    mentor_id: Some(mentor_id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(won);

        let current = repo.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(current.status, SyncStatus::Success);
        assert_eq!(current.mentor_id, Some(mentor_id));
        assert_eq!(current.attempt_count, 0);
        assert!(current.sync_error.is_none());
        assert_eq!(
            current.raw_data,
            Some(serde_json::json!({"name": "Nina Simone"}))
        );
        assert!(current.last_synced.is_some());
    }

    #[tokio::test]
    async fn cas_increments_attempts() {
        let repo = SyncJobRepository::new(test_db().await);
        let job = repo.insert(spotify_job("artist-1")).await.unwrap();

        for expected_attempts in 1..=3 {
            repo.compare_and_set_status(
                job.id,
                SyncStatus::Pending,
                SyncStatus::Running,
                JobUpdate::default(),
            )
            .await
            .unwrap();
            repo.compare_and_set_status(
                job.id,
                SyncStatus::Running,
                SyncStatus::Failed,
                JobUpdate {
                    sync_error: Some("AdapterUnavailable: upstream 503".to_string()),
                    increment_attempts: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
            repo.compare_and_set_status(
                job.id,
                SyncStatus::Failed,
                SyncStatus::Pending,
                JobUpdate::default(),
            )
            .await
            .unwrap();

            let current = repo.find_by_id(job.id).await.unwrap().unwrap();
            assert_eq!(current.attempt_count, expected_attempts);
        }
    }

    #[tokio::test]
    async fn pending_jobs_listed_in_admission_order() {
        let repo = SyncJobRepository::new(test_db().await);

        let urgent = repo
            .insert(NewSyncJob {
                priority: 1,
                ..spotify_job("urgent")
            })
            .await
            .unwrap();
        let stale = repo.insert(spotify_job("stale")).await.unwrap();
        let fresh = repo.insert(spotify_job("fresh")).await.unwrap();
        let never = repo.insert(spotify_job("never")).await.unwrap();

        // Give the two default-priority jobs distinguishable sync ages.
        for (id, age_hours) in [(stale.id, 10), (fresh.id, 1)] {
            repo.compare_and_set_status(
                id,
                SyncStatus::Pending,
                SyncStatus::Pending,
                JobUpdate {
                    last_synced: Some(
                        (Utc::now() - chrono::Duration::hours(age_hours)).fixed_offset(),
                    ),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let order: Vec<Uuid> = repo
            .list_pending(10)
            .await
            .unwrap()
            .into_iter()
            .map(|job| job.id)
            .collect();
        assert_eq!(order, vec![urgent.id, never.id, stale.id, fresh.id]);
    }

    #[tokio::test]
    async fn sweep_requeues_only_stale_running() {
        let repo = SyncJobRepository::new(test_db().await);
        let stale = repo.insert(spotify_job("stale")).await.unwrap();
        let fresh = repo.insert(spotify_job("fresh")).await.unwrap();

        for id in [stale.id, fresh.id] {
            repo.compare_and_set_status(
                id,
                SyncStatus::Pending,
                SyncStatus::Running,
                JobUpdate::default(),
            )
            .await
            .unwrap();
        }

        // A deadline in the future catches both; one just ahead of the fresh
        // transition catches neither. Split them with a mid-flight deadline
        // by backdating the stale row.
        let backdated = (Utc::now() - chrono::Duration::minutes(10)).fixed_offset();
        crate::models::sync_job::Entity::update_many()
            .col_expr(Column::UpdatedAt, Expr::value(backdated))
            .filter(Column::Id.eq(stale.id))
            .exec(&repo.db)
            .await
            .unwrap();

        let deadline = (Utc::now() - chrono::Duration::minutes(2)).fixed_offset();
        let swept = repo.sweep_stale_running(deadline).await.unwrap();
        assert_eq!(swept, 1);

        let stale_now = repo.find_by_id(stale.id).await.unwrap().unwrap();
        assert_eq!(stale_now.status, SyncStatus::Pending);
        let fresh_now = repo.find_by_id(fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh_now.status, SyncStatus::Running);
    }

    #[tokio::test]
    async fn running_counts_grouped_by_source() {
        let repo = SyncJobRepository::new(test_db().await);

        for source_id in ["a", "b"] {
            let job = repo.insert(spotify_job(source_id)).await.unwrap();
            repo.compare_and_set_status(
                job.id,
                SyncStatus::Pending,
                SyncStatus::Running,
                JobUpdate::default(),
            )
            .await
            .unwrap();
        }
        repo.insert(NewSyncJob {
            source: SyncSource::Lastfm,
            source_id: "c".to_string(),
            priority: 5,
            sync_interval: SyncInterval::Daily,
        })
        .await
        .unwrap();

        let counts = repo.count_running_by_source().await.unwrap();
        assert_eq!(counts.get(&SyncSource::Spotify), Some(&2));
        assert_eq!(counts.get(&SyncSource::Lastfm), None);
    }
}
