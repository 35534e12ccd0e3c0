//! Repository layer
//!
//! Database access for sync jobs and mentor profiles, kept behind small
//! structs so the scheduler, executor and handlers share one set of
//! transition primitives.

pub mod mentor_profile;
pub mod sync_job;

pub use mentor_profile::{MentorProfileRepository, NewMentorProfile};
pub use sync_job::{JobFilter, JobUpdate, NewSyncJob, SyncJobRepository};
