//! Database migrations for the artist sync engine.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_01_10_000100_create_sync_jobs;
mod m2026_01_10_000200_create_mentor_profiles;
mod m2026_01_10_000300_add_sync_jobs_active_key_guard;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_01_10_000100_create_sync_jobs::Migration),
            Box::new(m2026_01_10_000200_create_mentor_profiles::Migration),
            Box::new(m2026_01_10_000300_add_sync_jobs_active_key_guard::Migration),
        ]
    }
}
