//! Domain models for the recommendation pipeline.

use crate::catalog::{TrackCandidate, TrackSource};
use serde::{Deserialize, Serialize};

/// User-supplied preferences for one request. Immutable per request; a
/// refinement supplies an additional value that is merged, not replaced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Free-text description of what the user wants.
    pub description: String,
    /// Preferred song languages, in priority order.
    pub preferred_languages: Vec<String>,
    /// Optional genre or mood hint.
    pub genre_hints: Option<String>,
}

impl Preferences {
    pub fn is_empty(&self) -> bool {
        self.description.trim().is_empty()
            && self.preferred_languages.is_empty()
            && self.genre_hints.is_none()
    }

    /// Merge an original value with accumulated refinements into one
    /// effective value: descriptions and hints are concatenated,
    /// languages are unioned preserving first-seen order.
    pub fn combined<'a>(
        original: &'a Preferences,
        extra: impl Iterator<Item = &'a Preferences>,
    ) -> Preferences {
        let mut descriptions = Vec::new();
        let mut languages: Vec<String> = Vec::new();
        let mut hints = Vec::new();

        for prefs in std::iter::once(original).chain(extra) {
            if !prefs.description.trim().is_empty() {
                descriptions.push(prefs.description.trim().to_string());
            }
            for lang in &prefs.preferred_languages {
                if !languages.iter().any(|l| l.eq_ignore_ascii_case(lang)) {
                    languages.push(lang.clone());
                }
            }
            if let Some(hint) = prefs.genre_hints.as_deref() {
                if !hint.trim().is_empty() {
                    hints.push(hint.trim().to_string());
                }
            }
        }

        Preferences {
            description: descriptions.join("; "),
            preferred_languages: languages,
            genre_hints: if hints.is_empty() {
                None
            } else {
                Some(hints.join("; "))
            },
        }
    }
}

/// Scene analysis derived from the image caption plus preferences.
/// Recomputed on every refinement, never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneAnalysis {
    pub mood: String,
    pub setting: String,
    pub keywords: Vec<String>,
}

/// A track in the final ranked response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedTrack {
    pub title: String,
    pub artist: String,
    pub external_id: String,
    pub external_link: String,
    pub popularity_score: u32,
    pub source: TrackSource,
    /// Generated social-media caption for this track.
    pub caption: String,
    /// 1-based position in the response. Stable only within one response.
    pub rank: u32,
}

impl RecommendedTrack {
    pub fn from_candidate(candidate: TrackCandidate, caption: String, rank: u32) -> Self {
        Self {
            title: candidate.title,
            artist: candidate.artist,
            external_id: candidate.external_id,
            external_link: candidate.external_link,
            popularity_score: candidate.popularity_score,
            source: candidate.source,
            caption,
            rank,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs(description: &str, languages: &[&str], hint: Option<&str>) -> Preferences {
        Preferences {
            description: description.to_string(),
            preferred_languages: languages.iter().map(|s| s.to_string()).collect(),
            genre_hints: hint.map(|s| s.to_string()),
        }
    }

    #[test]
    fn combined_concatenates_descriptions_in_order() {
        let original = prefs("upbeat songs", &[], None);
        let extra = vec![prefs("more acoustic", &[], None), prefs("no remixes", &[], None)];
        let merged = Preferences::combined(&original, extra.iter());
        assert_eq!(merged.description, "upbeat songs; more acoustic; no remixes");
    }

    #[test]
    fn combined_unions_languages_preserving_order() {
        let original = prefs("", &["Hindi", "English"], None);
        let extra = vec![prefs("", &["english", "Tamil"], None)];
        let merged = Preferences::combined(&original, extra.iter());
        assert_eq!(merged.preferred_languages, vec!["Hindi", "English", "Tamil"]);
    }

    #[test]
    fn combined_joins_genre_hints() {
        let original = prefs("", &[], Some("lo-fi"));
        let extra = vec![prefs("", &[], Some("jazz"))];
        let merged = Preferences::combined(&original, extra.iter());
        assert_eq!(merged.genre_hints.as_deref(), Some("lo-fi; jazz"));
    }

    #[test]
    fn empty_preferences_merge_to_empty() {
        let merged = Preferences::combined(&Preferences::default(), std::iter::empty());
        assert!(merged.is_empty());
    }
}
