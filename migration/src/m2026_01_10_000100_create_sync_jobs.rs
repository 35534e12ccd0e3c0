//! Migration to create the sync_jobs table.
//!
//! A sync job tracks the synchronization state of one (source, source_id)
//! pairing: scheduling cadence, retry counters, the last fetched payload,
//! and the link to the downstream mentor profile.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncJobs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SyncJobs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(SyncJobs::Source).text().not_null())
                    .col(ColumnDef::new(SyncJobs::SourceId).text().not_null())
                    .col(ColumnDef::new(SyncJobs::MentorId).uuid().null())
                    .col(
                        ColumnDef::new(SyncJobs::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::Priority)
                            .small_integer()
                            .not_null()
                            .default(5),
                    )
                    .col(ColumnDef::new(SyncJobs::SyncInterval).text().not_null())
                    .col(
                        ColumnDef::new(SyncJobs::LastSynced)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(SyncJobs::SyncError).text().null())
                    .col(ColumnDef::new(SyncJobs::RawData).json_binary().null())
                    .col(
                        ColumnDef::new(SyncJobs::AttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index for admission scans: due pending jobs ordered by priority.
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_sync_jobs_status_priority_created ON sync_jobs (status, priority, created_at)".to_string(),
            ))
            .await?;

        // Index for per-source in-flight counting and filtered listings.
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_jobs_source_status")
                    .table(SyncJobs::Table)
                    .col(SyncJobs::Source)
                    .col(SyncJobs::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_sync_jobs_status_priority_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_sync_jobs_source_status").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(SyncJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncJobs {
    Table,
    Id,
    Source,
    SourceId,
    MentorId,
    Status,
    Priority,
    SyncInterval,
    LastSynced,
    SyncError,
    RawData,
    AttemptCount,
    CreatedAt,
    UpdatedAt,
}
