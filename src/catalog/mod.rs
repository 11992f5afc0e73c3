//! Music catalog search.
//!
//! The catalog verifies LLM song suggestions against real track metadata
//! and supplies popularity-ranked filler results.

mod models;
mod spotify;

pub use models::{TrackCandidate, TrackSource};
pub use spotify::SpotifyClient;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when querying the catalog API.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Request timeout")]
    Timeout,
}

/// Trait for music catalog search services.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Search the catalog for tracks matching a free-text query.
    ///
    /// A query with no hits returns an empty list, not an error.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackCandidate>, CatalogError>;
}
