//! # Data Models
//!
//! This module contains all the data models used throughout the sync engine.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod mentor_profile;
pub mod sync_job;

pub use mentor_profile::Entity as MentorProfile;
pub use sync_job::Entity as SyncJob;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "artist-sync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
