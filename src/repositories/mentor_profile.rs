//! # MentorProfile Repository
//!
//! Thin persistence layer for mentor profiles. The merge policy (which
//! fields a new payload may overwrite) lives in the linker; this module only
//! moves rows in and out of the table.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, Set};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::mentor_profile::{ActiveModel, Entity, Model};

/// Fields for a profile being created on a job's first successful sync.
#[derive(Debug, Clone)]
pub struct NewMentorProfile {
    pub display_name: String,
    pub bio: Option<String>,
    pub image_url: Option<String>,
    pub genres: Option<JsonValue>,
    pub external_urls: Option<JsonValue>,
    pub follower_count: Option<i64>,
}

#[derive(Clone)]
pub struct MentorProfileRepository {
    db: DatabaseConnection,
}

impl MentorProfileRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(id).one(&self.db).await
    }

    pub async fn insert(&self, profile: NewMentorProfile) -> Result<Model, DbErr> {
        let now = Utc::now().fixed_offset();

        let row = ActiveModel {
            id: Set(Uuid::new_v4()),
            display_name: Set(profile.display_name),
            bio: Set(profile.bio),
            image_url: Set(profile.image_url),
            genres: Set(profile.genres),
            external_urls: Set(profile.external_urls),
            follower_count: Set(profile.follower_count),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = row.insert(&self.db).await?;
        tracing::info!(mentor_id = %created.id, "Mentor profile created");
        Ok(created)
    }

    /// Remove a profile whose creating sync attempt was discarded.
    pub async fn delete(&self, id: Uuid) -> Result<(), DbErr> {
        Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(())
    }

    /// Persist an already-merged profile, bumping updated_at.
    pub async fn update(&self, merged: Model) -> Result<Model, DbErr> {
        let row = ActiveModel {
            id: Set(merged.id),
            display_name: Set(merged.display_name),
            bio: Set(merged.bio),
            image_url: Set(merged.image_url),
            genres: Set(merged.genres),
            external_urls: Set(merged.external_urls),
            follower_count: Set(merged.follower_count),
            created_at: Set(merged.created_at),
            updated_at: Set(Utc::now().fixed_offset()),
        };

        row.update(&self.db).await
    }
}
