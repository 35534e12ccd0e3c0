//! Mentor profile linker
//!
//! Translates a raw provider payload into mentor profile fields and writes
//! them through the profile repository. The first successful sync of a job
//! creates the profile; every later success merges into it, so the mentor id
//! handed out on creation stays stable for the life of the job.
//!
//! Merge policy: a field present in the new payload overwrites, a field the
//! provider did not send leaves the stored value alone. `external_urls` is
//! merged per source key so profiles fed by several providers keep one URL
//! per provider.

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, DbErr};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use uuid::Uuid;

use crate::models::sync_job::{Model as SyncJob, SyncSource};
use crate::repositories::{MentorProfileRepository, NewMentorProfile};

#[derive(Debug, Error)]
pub enum LinkError {
    /// The payload is missing a field the profile cannot exist without.
    /// Usually means the provider changed its export format.
    #[error("payload missing required field '{field}'")]
    MissingField { field: &'static str },

    /// The job references a mentor profile that no longer exists.
    #[error("mentor profile {mentor_id} not found")]
    ProfileMissing { mentor_id: Uuid },

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

/// Fields extracted from one provider payload.
#[derive(Debug, Clone, PartialEq)]
pub struct MentorFields {
    pub display_name: String,
    pub bio: Option<String>,
    pub image_url: Option<String>,
    pub genres: Option<JsonValue>,
    pub external_url: Option<String>,
    pub follower_count: Option<i64>,
}

/// Profile persistence as the executor sees it.
#[async_trait]
pub trait ProfileLinker: Send + Sync {
    /// Materialize `raw` into the job's mentor profile, creating it on the
    /// first success. Returns the mentor id the job should carry.
    async fn link(&self, job: &SyncJob, raw: &JsonValue) -> Result<Uuid, LinkError>;

    /// Drop a profile created by an attempt whose outcome was discarded, so
    /// the next attempt creates a fresh one instead of leaving an orphan.
    async fn discard(&self, mentor_id: Uuid) -> Result<(), DbErr>;
}

pub struct MentorLinker {
    profiles: MentorProfileRepository,
}

impl MentorLinker {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            profiles: MentorProfileRepository::new(db),
        }
    }
}

#[async_trait]
impl ProfileLinker for MentorLinker {
    async fn link(&self, job: &SyncJob, raw: &JsonValue) -> Result<Uuid, LinkError> {
        let fields = extract_fields(job.source, raw)?;

        match job.mentor_id {
            Some(mentor_id) => {
                let existing = self
                    .profiles
                    .find_by_id(mentor_id)
                    .await?
                    .ok_or(LinkError::ProfileMissing { mentor_id })?;
                let merged = merge_profile(existing, job.source, fields);
                let updated = self.profiles.update(merged).await?;
                tracing::debug!(
                    mentor_id = %updated.id,
                    source = %job.source,
                    "Mentor profile refreshed"
                );
                Ok(updated.id)
            }
            None => {
                let created = self
                    .profiles
                    .insert(NewMentorProfile {
                        display_name: fields.display_name,
                        bio: fields.bio,
                        image_url: fields.image_url,
                        genres: fields.genres,
                        external_urls: fields.external_url.map(|url| {
                            let mut urls = Map::new();
                            urls.insert(job.source.as_str().to_string(), JsonValue::String(url));
                            JsonValue::Object(urls)
                        }),
                        follower_count: fields.follower_count,
                    })
                    .await?;
                tracing::info!(
                    mentor_id = %created.id,
                    source = %job.source,
                    source_id = %job.source_id,
                    "Mentor profile linked"
                );
                Ok(created.id)
            }
        }
    }

    async fn discard(&self, mentor_id: Uuid) -> Result<(), DbErr> {
        self.profiles.delete(mentor_id).await?;
        tracing::warn!(mentor_id = %mentor_id, "Orphaned mentor profile removed");
        Ok(())
    }
}

/// Pull profile fields out of a provider payload. Each provider has its own
/// shape; only `display_name` is mandatory across all of them.
pub fn extract_fields(source: SyncSource, raw: &JsonValue) -> Result<MentorFields, LinkError> {
    match source {
        SyncSource::Spotify => extract_spotify(raw),
        SyncSource::Genius => extract_genius(raw),
        SyncSource::Lastfm => extract_lastfm(raw),
    }
}

fn extract_spotify(raw: &JsonValue) -> Result<MentorFields, LinkError> {
    let display_name = required_str(raw, "/name", "name")?;

    Ok(MentorFields {
        display_name,
        bio: None,
        image_url: pointer_str(raw, "/images/0/url"),
        genres: raw.pointer("/genres").filter(|v| v.is_array()).cloned(),
        external_url: pointer_str(raw, "/external_urls/spotify"),
        follower_count: raw.pointer("/followers/total").and_then(JsonValue::as_i64),
    })
}

fn extract_genius(raw: &JsonValue) -> Result<MentorFields, LinkError> {
    // The Genius API wraps everything in a response envelope; accept the
    // bare artist object as well.
    let artist = raw.pointer("/response/artist").unwrap_or(raw);
    let display_name = required_str(artist, "/name", "name")?;

    let bio = pointer_str(artist, "/description/plain")
        .or_else(|| pointer_str(artist, "/description"));

    Ok(MentorFields {
        display_name,
        bio,
        image_url: pointer_str(artist, "/image_url"),
        genres: None,
        external_url: pointer_str(artist, "/url"),
        follower_count: artist
            .pointer("/followers_count")
            .and_then(JsonValue::as_i64),
    })
}

fn extract_lastfm(raw: &JsonValue) -> Result<MentorFields, LinkError> {
    let artist = raw
        .pointer("/artist")
        .ok_or(LinkError::MissingField { field: "artist" })?;
    let display_name = required_str(artist, "/name", "artist.name")?;

    // Last.fm reports listeners as a decimal string.
    let follower_count = match artist.pointer("/stats/listeners") {
        Some(JsonValue::String(s)) => s.parse().ok(),
        Some(value) => value.as_i64(),
        None => None,
    };

    Ok(MentorFields {
        display_name,
        bio: pointer_str(artist, "/bio/summary"),
        image_url: None,
        genres: None,
        external_url: pointer_str(artist, "/url"),
        follower_count,
    })
}

fn pointer_str(raw: &JsonValue, pointer: &str) -> Option<String> {
    raw.pointer(pointer)
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required_str(
    raw: &JsonValue,
    pointer: &str,
    field: &'static str,
) -> Result<String, LinkError> {
    pointer_str(raw, pointer).ok_or(LinkError::MissingField { field })
}

/// Apply new payload fields onto an existing profile.
fn merge_profile(
    mut profile: crate::models::mentor_profile::Model,
    source: SyncSource,
    fields: MentorFields,
) -> crate::models::mentor_profile::Model {
    profile.display_name = fields.display_name;
    if fields.bio.is_some() {
        profile.bio = fields.bio;
    }
    if fields.image_url.is_some() {
        profile.image_url = fields.image_url;
    }
    if fields.genres.is_some() {
        profile.genres = fields.genres;
    }
    if fields.follower_count.is_some() {
        profile.follower_count = fields.follower_count;
    }
    if let Some(url) = fields.external_url {
        let mut urls = match profile.external_urls.take() {
            Some(JsonValue::Object(map)) => map,
            _ => Map::new(),
        };
        urls.insert(source.as_str().to_string(), JsonValue::String(url));
        profile.external_urls = Some(JsonValue::Object(urls));
    }
    profile
}
