//! Track candidate types shared by the catalog client and the merger.

use serde::{Deserialize, Serialize};

/// Where a candidate track came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSource {
    /// Suggested by the LLM, metadata verified against the catalog.
    LlmSuggested,
    /// Found directly through catalog keyword search.
    CatalogSearch,
}

/// A candidate track, either an LLM suggestion (not yet verified, empty
/// external fields) or a catalog search hit with real metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackCandidate {
    pub title: String,
    pub artist: String,
    pub external_id: String,
    pub external_link: String,
    pub popularity_score: u32,
    pub source: TrackSource,
}

impl TrackCandidate {
    /// An unverified suggestion produced by the reasoner.
    pub fn suggestion(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            external_id: String::new(),
            external_link: String::new(),
            popularity_score: 0,
            source: TrackSource::LlmSuggested,
        }
    }
}
