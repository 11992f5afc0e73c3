//! Social-media caption generation for recommended tracks.
//!
//! One LLM call covers the whole batch; any failure falls back to a
//! deterministic template per track, so caption generation can never
//! fail a request.

use super::models::SceneAnalysis;
use crate::catalog::TrackCandidate;
use crate::llm::{CompletionOptions, LlmProvider, Message};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

/// Deterministic caption used whenever generation fails or comes back
/// incomplete.
pub fn template_caption(scene: &SceneAnalysis, track: &TrackCandidate) -> String {
    let mood = if scene.mood.is_empty() || scene.mood == "unknown" {
        "perfect".to_string()
    } else {
        scene.mood.clone()
    };
    format!(
        "Perfect for a {} moment: {} by {} #MusicVibes",
        mood, track.title, track.artist
    )
}

pub struct CaptionWriter {
    provider: Arc<dyn LlmProvider>,
    options: CompletionOptions,
}

impl CaptionWriter {
    pub fn new(provider: Arc<dyn LlmProvider>, options: CompletionOptions) -> Self {
        Self { provider, options }
    }

    /// Produce one caption per track, in track order. Never fails;
    /// degraded entries get the template caption.
    pub async fn write_captions(
        &self,
        scene: &SceneAnalysis,
        tracks: &[TrackCandidate],
    ) -> Vec<String> {
        if tracks.is_empty() {
            return Vec::new();
        }

        let generated = match self.generate(scene, tracks).await {
            Ok(captions) => captions,
            Err(reason) => {
                warn!(reason = %reason, "Caption generation failed, using templates");
                crate::server::metrics::record_degradation("captions");
                Vec::new()
            }
        };

        tracks
            .iter()
            .enumerate()
            .map(|(i, track)| {
                generated
                    .get(i)
                    .filter(|c| !c.trim().is_empty())
                    .cloned()
                    .unwrap_or_else(|| template_caption(scene, track))
            })
            .collect()
    }

    async fn generate(
        &self,
        scene: &SceneAnalysis,
        tracks: &[TrackCandidate],
    ) -> Result<Vec<String>, String> {
        let track_list: Vec<String> = tracks
            .iter()
            .map(|t| format!("{} by {}", t.title, t.artist))
            .collect();

        let prompt = format!(
            "Write one short Instagram caption for each song below, matching a photo with \
             mood \"{}\" and setting \"{}\". Write like a real user would caption their post, \
             2-4 hashtags maximum, authentic and not promotional.\n\
             \n\
             SONGS:\n{}\n\
             \n\
             Respond with this EXACT JSON format:\n\
             {{\"captions\": [{{\"suggested_caption\": \"caption for the first song\"}}]}}\n\
             One entry per song, in the same order.",
            scene.mood,
            scene.setting,
            track_list.join("\n"),
        );

        let messages = [Message::user(prompt)];
        let response = self
            .provider
            .complete(&messages, &self.options)
            .await
            .map_err(|e| e.to_string())?;

        parse_captions(&response.content).ok_or_else(|| "unparseable caption response".to_string())
    }
}

fn parse_captions(text: &str) -> Option<Vec<String>> {
    let trimmed = text.trim();
    let cleaned = trimmed.trim_start_matches("```json").trim_matches('`').trim();

    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    let body: CaptionsResponse = serde_json::from_str(&cleaned[start..=end]).ok()?;

    Some(
        body.captions
            .into_iter()
            .map(|c| c.suggested_caption.trim().to_string())
            .collect(),
    )
}

#[derive(Debug, Deserialize)]
struct CaptionsResponse {
    #[serde(default)]
    captions: Vec<CaptionEntry>,
}

#[derive(Debug, Deserialize)]
struct CaptionEntry {
    #[serde(default)]
    suggested_caption: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TrackSource;

    fn scene(mood: &str) -> SceneAnalysis {
        SceneAnalysis {
            mood: mood.to_string(),
            setting: "urban".to_string(),
            keywords: vec![],
        }
    }

    fn track(title: &str, artist: &str) -> TrackCandidate {
        TrackCandidate {
            title: title.to_string(),
            artist: artist.to_string(),
            external_id: "id".to_string(),
            external_link: "https://x".to_string(),
            popularity_score: 50,
            source: TrackSource::CatalogSearch,
        }
    }

    #[test]
    fn template_references_mood_and_track() {
        let caption = template_caption(&scene("rainy"), &track("Umbrella", "Rihanna"));
        assert!(caption.contains("rainy"));
        assert!(caption.contains("Umbrella"));
        assert!(caption.contains("Rihanna"));
    }

    #[test]
    fn template_substitutes_unknown_mood() {
        let caption = template_caption(&scene("unknown"), &track("Halo", "Beyonce"));
        assert!(caption.contains("perfect"));
        assert!(!caption.contains("unknown"));
    }

    #[test]
    fn parses_caption_response() {
        let raw = r#"{"captions": [{"suggested_caption": "Night drives hit different #NightVibes"}]}"#;
        let captions = parse_captions(raw).unwrap();
        assert_eq!(captions, vec!["Night drives hit different #NightVibes"]);
    }

    #[test]
    fn parses_fenced_caption_response() {
        let raw = "```json\n{\"captions\": [{\"suggested_caption\": \"ok\"}]}\n```";
        assert_eq!(parse_captions(raw).unwrap(), vec!["ok"]);
    }

    #[test]
    fn garbage_caption_response_is_none() {
        assert!(parse_captions("no json here").is_none());
    }
}
