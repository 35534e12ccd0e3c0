//! Source adapters
//!
//! This module provides the provider adapter layer including:
//! - The `SourceAdapter` trait defining the fetch interface for all providers
//! - A registry mapping each sync source to its adapter instance
//! - Individual adapter implementations for Spotify, Genius and Last.fm

pub mod genius;
pub mod lastfm;
pub mod registry;
pub mod spotify;
pub mod trait_;

pub use genius::GeniusAdapter;
pub use lastfm::LastfmAdapter;
pub use registry::{AdapterRegistry, RegistryError};
pub use spotify::SpotifyAdapter;
pub use trait_::{AdapterError, SourceAdapter};
