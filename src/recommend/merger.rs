//! Reconciliation of LLM suggestions with catalog search results.
//!
//! Suggestions the catalog can verify are promoted to the front of the
//! list; suggestions with no catalog match carry no usable link and are
//! dropped. The response never contains a track without a verifiable
//! external link.

use super::models::RecommendedTrack;
use crate::catalog::{TrackCandidate, TrackSource};
use std::collections::HashSet;
use tracing::debug;

/// Normalize a title or artist for matching: lowercase with whitespace
/// collapsed to single spaces.
pub fn normalize_for_match(s: &str) -> String {
    s.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Merge LLM suggestions with catalog results into one ordered,
/// deduplicated candidate list of at most `limit` entries.
///
/// Matched suggestions come first in suggestion order, then unmatched
/// catalog results by descending popularity. `limit` must be positive.
pub fn merge_candidates(
    llm_suggestions: &[TrackCandidate],
    catalog_results: Vec<TrackCandidate>,
    limit: usize,
) -> Vec<TrackCandidate> {
    assert!(limit > 0, "merge limit must be positive");

    let mut matched_indices: HashSet<usize> = HashSet::new();
    let mut merged: Vec<TrackCandidate> = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();

    // Promote catalog entries matching a suggestion, preserving the
    // suggestion order so the LLM's creative intent leads the list.
    for suggestion in llm_suggestions {
        let title = normalize_for_match(&suggestion.title);
        let artist = normalize_for_match(&suggestion.artist);

        let found = catalog_results.iter().enumerate().find(|(i, entry)| {
            !matched_indices.contains(i)
                && normalize_for_match(&entry.title) == title
                && normalize_for_match(&entry.artist) == artist
        });

        if let Some((index, entry)) = found {
            matched_indices.insert(index);
            if seen_ids.insert(entry.external_id.clone()) {
                let mut promoted = entry.clone();
                promoted.source = TrackSource::LlmSuggested;
                merged.push(promoted);
            }
        }
        // Unmatched suggestions have no verifiable link and are dropped.
    }

    // Fill remaining slots with unmatched catalog results, most popular first.
    let mut filler: Vec<TrackCandidate> = catalog_results
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !matched_indices.contains(i))
        .map(|(_, entry)| entry)
        .collect();
    filler.sort_by(|a, b| b.popularity_score.cmp(&a.popularity_score));

    for entry in filler {
        if merged.len() >= limit {
            break;
        }
        if seen_ids.insert(entry.external_id.clone()) {
            merged.push(entry);
        }
    }

    merged.truncate(limit);

    debug!(
        matched = matched_indices.len(),
        total = merged.len(),
        "Merged recommendations"
    );

    merged
}

/// Pair ordered candidates with their captions and assign 1-based ranks.
///
/// `captions` must be at least as long as `candidates`; extra captions
/// are ignored.
pub fn rank_with_captions(
    candidates: Vec<TrackCandidate>,
    captions: Vec<String>,
) -> Vec<RecommendedTrack> {
    candidates
        .into_iter()
        .zip(captions)
        .enumerate()
        .map(|(i, (candidate, caption))| {
            RecommendedTrack::from_candidate(candidate, caption, i as u32 + 1)
        })
        .collect()
}
