//! # Artist Sync Library
//!
//! Background engine that keeps artist metadata in sync with external
//! providers, plus the REST status surface used to enqueue, inspect and
//! refresh sync jobs.

pub mod adapters;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod linker;
pub mod models;
pub mod repositories;
pub mod scheduler;
pub mod server;
pub mod telemetry;
pub use migration;
