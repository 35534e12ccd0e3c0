//! MentorProfile entity model
//!
//! Downstream profile record owned by the linker. Created on a job's first
//! successful sync and merged into on every later success, so the mentor id
//! stays stable across provider export format changes.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "mentor_profiles")]
pub struct Model {
    /// Profile identifier; referenced by sync_jobs.mentor_id
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Display name extracted from the provider payload (required)
    pub display_name: String,

    /// Biography or description text, when the provider supplies one
    pub bio: Option<String>,

    /// Primary image URL
    pub image_url: Option<String>,

    /// Genre tags as a JSON array of strings
    #[sea_orm(column_type = "JsonBinary")]
    pub genres: Option<JsonValue>,

    /// Per-source canonical URLs as a JSON object keyed by source name
    #[sea_orm(column_type = "JsonBinary")]
    pub external_urls: Option<JsonValue>,

    /// Follower or listener count, when the provider reports one
    pub follower_count: Option<i64>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
