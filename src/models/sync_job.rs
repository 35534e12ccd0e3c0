//! SyncJob entity model
//!
//! This module contains the SeaORM entity model for the sync_jobs table,
//! which represents one (source, source_id) pairing's synchronization state,
//! plus the closed enums for source, status, and cadence.

use chrono::Duration;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

/// External provider a job pulls from.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum SyncSource {
    #[sea_orm(string_value = "spotify")]
    Spotify,
    #[sea_orm(string_value = "genius")]
    Genius,
    #[sea_orm(string_value = "lastfm")]
    Lastfm,
}

impl SyncSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncSource::Spotify => "spotify",
            SyncSource::Genius => "genius",
            SyncSource::Lastfm => "lastfm",
        }
    }
}

impl std::fmt::Display for SyncSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job state machine: pending -> running -> success | failed.
///
/// Terminal states flow back to pending through the scheduler once the next
/// due time (or backoff) arrives; they are never advanced by the executor.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Running => "running",
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
        }
    }

    /// Pending and running rows count against the per-key uniqueness guard.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::Running)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Re-scheduling cadence applied after a terminal state.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum SyncInterval {
    #[sea_orm(string_value = "hourly")]
    Hourly,
    #[sea_orm(string_value = "daily")]
    Daily,
    #[sea_orm(string_value = "weekly")]
    Weekly,
    #[sea_orm(string_value = "monthly")]
    Monthly,
}

impl SyncInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncInterval::Hourly => "hourly",
            SyncInterval::Daily => "daily",
            SyncInterval::Weekly => "weekly",
            SyncInterval::Monthly => "monthly",
        }
    }

    /// Wall-clock duration of one cadence period.
    pub fn duration(&self) -> Duration {
        match self {
            SyncInterval::Hourly => Duration::hours(1),
            SyncInterval::Daily => Duration::days(1),
            SyncInterval::Weekly => Duration::weeks(1),
            SyncInterval::Monthly => Duration::days(30),
        }
    }
}

impl std::fmt::Display for SyncInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SyncJob entity tracking one provider entity's synchronization lifecycle
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_jobs")]
pub struct Model {
    /// Unique identifier for the sync job (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Provider this job pulls from; fixed at creation
    pub source: SyncSource,

    /// Provider-side identifier; (source, source_id) is the natural key
    pub source_id: String,

    /// Downstream profile linked on first successful sync, never cleared
    pub mentor_id: Option<Uuid>,

    /// Current state machine position
    pub status: SyncStatus,

    /// Scheduling priority 1..=10, lower runs earlier; admission order only
    pub priority: i16,

    /// Cadence for re-scheduling after a terminal state
    pub sync_interval: SyncInterval,

    /// Finish time of the most recent attempt; None means never attempted,
    /// which the scheduler treats as overdue (manual-refresh sentinel)
    pub last_synced: Option<DateTimeWithTimeZone>,

    /// "<Kind>: <message>" of the last failure, present only while failed
    pub sync_error: Option<String>,

    /// Last successfully fetched payload, opaque to all but the linker
    #[sea_orm(column_type = "JsonBinary")]
    pub raw_data: Option<JsonValue>,

    /// Consecutive failures since the last success
    pub attempt_count: i32,

    /// Timestamp when the job was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp of the last transition; doubles as the running-deadline
    /// reference for the stale sweep
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_durations_are_ordered() {
        assert!(SyncInterval::Hourly.duration() < SyncInterval::Daily.duration());
        assert!(SyncInterval::Daily.duration() < SyncInterval::Weekly.duration());
        assert!(SyncInterval::Weekly.duration() < SyncInterval::Monthly.duration());
    }

    #[test]
    fn active_statuses() {
        assert!(SyncStatus::Pending.is_active());
        assert!(SyncStatus::Running.is_active());
        assert!(!SyncStatus::Success.is_active());
        assert!(!SyncStatus::Failed.is_active());
    }

    #[test]
    fn enum_serde_round_trip() {
        let json = serde_json::to_string(&SyncSource::Lastfm).unwrap();
        assert_eq!(json, "\"lastfm\"");
        let status: SyncStatus = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(status, SyncStatus::Running);
    }
}
