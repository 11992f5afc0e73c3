//! Scene reasoning over an LLM.
//!
//! One completion yields search keywords, a scene analysis and a list of
//! title/artist suggestions. Model output is free text in practice, so
//! parsing works through a ladder of fallbacks and never lets raw model
//! text escape this module.

use super::models::{Preferences, SceneAnalysis};
use crate::captioner::ImageCaption;
use crate::catalog::TrackCandidate;
use crate::llm::{CompletionOptions, LlmError, LlmProvider, Message};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Keywords requested from the model per analysis.
const KEYWORD_COUNT: usize = 4;
/// Keyword count used when falling back to caption words.
const FALLBACK_KEYWORD_COUNT: usize = 6;

lazy_static! {
    static ref CODE_FENCE_RE: Regex = Regex::new(r"```(?:json)?").unwrap();
    static ref SUGGESTION_PAIR_RE: Regex =
        Regex::new(r#""song_title"\s*:\s*"([^"]+)"[^}]*"artist"\s*:\s*"([^"]+)""#).unwrap();
    static ref KEYWORDS_RE: Regex =
        Regex::new(r#""search_keywords"\s*:\s*\[([^\]]*)\]"#).unwrap();
    static ref TITLE_PREFIX_RE: Regex =
        Regex::new(r"(?i)^(\([^)]*\)\s*|Note:[^:]*:\s*)").unwrap();
}

pub struct Reasoner {
    provider: Arc<dyn LlmProvider>,
    options: CompletionOptions,
}

impl Reasoner {
    pub fn new(provider: Arc<dyn LlmProvider>, options: CompletionOptions) -> Self {
        Self { provider, options }
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Derive a scene analysis and track suggestions from the caption
    /// plus preferences.
    ///
    /// Transport failures surface as [`LlmError`] so the caller can
    /// degrade; malformed model output degrades here to a best-effort
    /// scene extracted from the caption and no suggestions.
    pub async fn analyze(
        &self,
        caption: &ImageCaption,
        preferences: &Preferences,
    ) -> Result<(SceneAnalysis, Vec<TrackCandidate>), LlmError> {
        let prompt = build_prompt(&caption.text, preferences);
        let messages = [
            Message::system("You are a professional music curator and social media content creator."),
            Message::user(prompt),
        ];

        let response = self.provider.complete(&messages, &self.options).await?;

        match parse_response(&response.content) {
            Some(parsed) => {
                debug!(
                    keywords = parsed.scene.keywords.len(),
                    suggestions = parsed.suggestions.len(),
                    "Reasoner response parsed"
                );
                Ok((parsed.scene, parsed.suggestions))
            }
            None => {
                warn!(
                    preview = %response.content.chars().take(200).collect::<String>(),
                    "Could not parse reasoner response, degrading to caption keywords"
                );
                crate::server::metrics::record_degradation("reasoner_parse");
                Ok((scene_from_caption(&caption.text), Vec::new()))
            }
        }
    }
}

/// Build the comprehensive prompt. Absent preference fields are
/// substituted with empty strings so the prompt is never malformed.
fn build_prompt(caption: &str, preferences: &Preferences) -> String {
    let languages = preferences.preferred_languages.join(", ");
    let hints = preferences.genre_hints.as_deref().unwrap_or("");

    let mut prompt = format!(
        "Based on this image description and user preferences, provide scene analysis, \
         exactly {keyword_count} catalog search keywords, and 10-15 specific real song recommendations.\n\
         \n\
         IMAGE DESCRIPTION: \"{caption}\"\n\
         USER PREFERENCES: \"{prefs}\"\n\
         GENRE/MOOD HINTS: \"{hints}\"\n",
        keyword_count = KEYWORD_COUNT,
        caption = caption,
        prefs = preferences.description,
        hints = hints,
    );

    if !languages.is_empty() {
        prompt.push_str(&format!(
            "PREFERRED LANGUAGES FOR SONGS: {}\n\
             Prioritize songs in these languages, but always use English/Roman script \
             for the search keywords since catalog metadata uses Roman script.\n",
            languages
        ));
    }

    prompt.push_str(
        "\nThe search keywords must be short, lowercase, evocative phrases in Roman script \
         that capture the scene mood. Keep song titles short and clean, with no explanations \
         in the title field.\n\
         \n\
         Respond with this EXACT JSON format (no markdown, no extra text):\n\
         {\n\
         \"search_keywords\": [\"keyword1\", \"keyword2\", \"keyword3\", \"keyword4\"],\n\
         \"scene_analysis\": {\n\
         \"primary_mood\": \"main emotional tone\",\n\
         \"setting_type\": \"indoor/outdoor/urban/nature/etc\",\n\
         \"atmosphere\": \"overall feeling\"\n\
         },\n\
         \"recommendations\": [\n\
         {\"song_title\": \"Exact Song Title\", \"artist\": \"Artist Name\"}\n\
         ]\n\
         }\n",
    );

    prompt
}

struct ParsedReasoning {
    scene: SceneAnalysis,
    suggestions: Vec<TrackCandidate>,
}

/// Parse the model response. Tries, in order: direct JSON, code-fence
/// stripping, brace extraction, then regex extraction of individual
/// components. Returns None only when nothing usable can be recovered.
fn parse_response(text: &str) -> Option<ParsedReasoning> {
    let trimmed = text.trim();

    if let Some(parsed) = serde_json::from_str::<RawReasoning>(trimmed)
        .ok()
        .and_then(usable)
    {
        return Some(parsed);
    }

    let cleaned = CODE_FENCE_RE.replace_all(trimmed, "").trim().to_string();
    if let Some(parsed) = serde_json::from_str::<RawReasoning>(&cleaned)
        .ok()
        .and_then(usable)
    {
        return Some(parsed);
    }

    // Extract the outermost brace-delimited block.
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Some(parsed) = serde_json::from_str::<RawReasoning>(&cleaned[start..=end])
                .ok()
                .and_then(usable)
            {
                return Some(parsed);
            }
        }
    }

    // Last resort: pull keywords and title/artist pairs out with regexes.
    let keywords: Vec<String> = KEYWORDS_RE
        .captures(&cleaned)
        .map(|caps| {
            caps[1]
                .split(',')
                .map(|k| k.trim().trim_matches('"').to_lowercase())
                .filter(|k| !k.is_empty())
                .take(KEYWORD_COUNT)
                .collect()
        })
        .unwrap_or_default();

    let suggestions: Vec<TrackCandidate> = SUGGESTION_PAIR_RE
        .captures_iter(&cleaned)
        .map(|caps| TrackCandidate::suggestion(clean_title(&caps[1]), caps[2].trim()))
        .collect();

    if keywords.is_empty() && suggestions.is_empty() {
        return None;
    }

    Some(ParsedReasoning {
        scene: SceneAnalysis {
            mood: "unknown".to_string(),
            setting: "unknown".to_string(),
            keywords,
        },
        suggestions,
    })
}

/// A parse counts only if it recovered something: keywords, suggestions
/// or at least a recognized mood.
fn usable(raw: RawReasoning) -> Option<ParsedReasoning> {
    let parsed: ParsedReasoning = raw.into();
    if parsed.scene.keywords.is_empty()
        && parsed.suggestions.is_empty()
        && parsed.scene.mood == "unknown"
    {
        None
    } else {
        Some(parsed)
    }
}

/// Best-effort scene built from the caption alone, used when the model
/// output is unusable or the reasoner is down entirely.
pub(crate) fn scene_from_caption(caption: &str) -> SceneAnalysis {
    let keywords = caption_keywords(caption);
    SceneAnalysis {
        mood: "unknown".to_string(),
        setting: "unknown".to_string(),
        keywords,
    }
}

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "in", "on", "at", "and", "or", "with", "is", "are", "was", "were",
    "to", "by", "for", "it", "its", "his", "her", "their", "there", "this", "that",
];

fn caption_keywords(caption: &str) -> Vec<String> {
    let mut keywords = Vec::new();
    for word in caption.split(|c: char| !c.is_alphanumeric()) {
        let word = word.to_lowercase();
        if word.len() < 3 || STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        if !keywords.contains(&word) {
            keywords.push(word);
        }
        if keywords.len() >= FALLBACK_KEYWORD_COUNT {
            break;
        }
    }
    keywords
}

/// Strip explanatory prefixes the model sometimes puts in title fields,
/// like leading parentheticals or "Note: ...:" text, and collapse
/// whitespace.
pub(crate) fn clean_title(title: &str) -> String {
    let cleaned = TITLE_PREFIX_RE.replace(title.trim(), "");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

// Wire shape of the model response.

#[derive(Debug, Deserialize)]
struct RawReasoning {
    #[serde(default)]
    search_keywords: Vec<String>,
    #[serde(default)]
    scene_analysis: Option<RawScene>,
    #[serde(default)]
    recommendations: Vec<RawSuggestion>,
}

#[derive(Debug, Deserialize)]
struct RawScene {
    #[serde(default)]
    primary_mood: Option<String>,
    #[serde(default)]
    setting_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSuggestion {
    #[serde(default)]
    song_title: String,
    #[serde(default)]
    artist: String,
}

impl From<RawReasoning> for ParsedReasoning {
    fn from(raw: RawReasoning) -> Self {
        let scene_block = raw.scene_analysis.unwrap_or(RawScene {
            primary_mood: None,
            setting_type: None,
        });

        let mut keywords: Vec<String> = raw
            .search_keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        keywords.dedup();
        keywords.truncate(KEYWORD_COUNT);

        let suggestions = raw
            .recommendations
            .into_iter()
            .filter_map(|s| {
                let title = clean_title(&s.song_title);
                let artist = s.artist.trim().to_string();
                if title.is_empty() || artist.is_empty() {
                    None
                } else {
                    Some(TrackCandidate::suggestion(title, artist))
                }
            })
            .collect();

        ParsedReasoning {
            scene: SceneAnalysis {
                mood: scene_block
                    .primary_mood
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "unknown".to_string()),
                setting: scene_block
                    .setting_type
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| "unknown".to_string()),
                keywords,
            },
            suggestions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_RESPONSE: &str = r#"{
        "search_keywords": ["rainy night", "melancholy", "city walk", "lo-fi chill"],
        "scene_analysis": {
            "primary_mood": "melancholic",
            "setting_type": "urban",
            "atmosphere": "wet neon streets"
        },
        "recommendations": [
            {"song_title": "Riders on the Storm", "artist": "The Doors"},
            {"song_title": "Set Fire to the Rain", "artist": "Adele"}
        ]
    }"#;

    #[test]
    fn parses_direct_json() {
        let parsed = parse_response(GOOD_RESPONSE).unwrap();
        assert_eq!(parsed.scene.mood, "melancholic");
        assert_eq!(parsed.scene.setting, "urban");
        assert_eq!(parsed.scene.keywords.len(), 4);
        assert_eq!(parsed.suggestions.len(), 2);
        assert_eq!(parsed.suggestions[0].title, "Riders on the Storm");
        assert_eq!(parsed.suggestions[0].artist, "The Doors");
    }

    #[test]
    fn parses_fenced_json() {
        let fenced = format!("```json\n{}\n```", GOOD_RESPONSE);
        let parsed = parse_response(&fenced).unwrap();
        assert_eq!(parsed.suggestions.len(), 2);
    }

    #[test]
    fn parses_json_embedded_in_prose() {
        let wrapped = format!("Sure! Here are my picks:\n{}\nEnjoy!", GOOD_RESPONSE);
        let parsed = parse_response(&wrapped).unwrap();
        assert_eq!(parsed.scene.mood, "melancholic");
    }

    #[test]
    fn regex_fallback_recovers_pairs_from_broken_json() {
        let broken = r#"
            "search_keywords": ["rain", "night"],
            "recommendations": [
                {"song_title": "November Rain", "notes": "classic", "artist": "Guns N' Roses"},
        "#;
        let parsed = parse_response(broken).unwrap();
        assert_eq!(parsed.scene.keywords, vec!["rain", "night"]);
        assert_eq!(parsed.suggestions.len(), 1);
        assert_eq!(parsed.suggestions[0].artist, "Guns N' Roses");
    }

    #[test]
    fn unparseable_response_returns_none() {
        assert!(parse_response("I cannot help with that.").is_none());
    }

    #[test]
    fn empty_suggestions_are_dropped() {
        let raw = r#"{"recommendations": [{"song_title": "", "artist": "X"}, {"song_title": "Y", "artist": ""}]}"#;
        assert!(parse_response(raw).is_none());
    }

    #[test]
    fn clean_title_strips_prefixes() {
        assert_eq!(clean_title("(Finding a match) Levitating"), "Levitating");
        assert_eq!(clean_title("Note: best guess: Halo"), "Halo");
        assert_eq!(clean_title("  Blinding   Lights  "), "Blinding Lights");
    }

    #[test]
    fn caption_keywords_skip_stopwords_and_short_words() {
        let keywords = caption_keywords("a person walking in rain at night");
        assert_eq!(keywords, vec!["person", "walking", "rain", "night"]);
    }

    #[test]
    fn prompt_handles_absent_preferences() {
        let prompt = build_prompt("a dog", &Preferences::default());
        assert!(prompt.contains("IMAGE DESCRIPTION: \"a dog\""));
        assert!(prompt.contains("USER PREFERENCES: \"\""));
        assert!(!prompt.contains("PREFERRED LANGUAGES"));
    }

    #[tokio::test]
    async fn unparseable_response_degrades_and_is_counted() {
        use crate::captioner::{ImageCaption, ModelTier};
        use crate::llm::{CompletionResponse, FinishReason, LlmProvider, Message};
        use async_trait::async_trait;
        use std::sync::Arc;

        struct ProseOnlyLlm;

        #[async_trait]
        impl LlmProvider for ProseOnlyLlm {
            fn name(&self) -> &str {
                "prose"
            }

            fn model(&self) -> &str {
                "prose-model"
            }

            async fn complete(
                &self,
                _messages: &[Message],
                _options: &CompletionOptions,
            ) -> Result<CompletionResponse, LlmError> {
                Ok(CompletionResponse {
                    content: "I cannot help with that.".to_string(),
                    finish_reason: FinishReason::Stop,
                    usage: None,
                })
            }
        }

        crate::server::metrics::init_metrics();
        let counter = crate::server::metrics::PIPELINE_DEGRADATIONS_TOTAL
            .with_label_values(&["reasoner_parse"]);
        let before = counter.get();

        let reasoner = Reasoner::new(Arc::new(ProseOnlyLlm), CompletionOptions::default());
        let caption = ImageCaption {
            text: "a person walking in rain at night".to_string(),
            model_used: ModelTier::Primary,
            confidence: None,
        };
        let (scene, suggestions) = reasoner
            .analyze(&caption, &Preferences::default())
            .await
            .unwrap();

        assert!(suggestions.is_empty());
        assert!(scene.keywords.contains(&"rain".to_string()));
        assert_eq!(counter.get(), before + 1.0);
    }

    #[test]
    fn prompt_includes_languages_when_present() {
        let prefs = Preferences {
            preferred_languages: vec!["Hindi".to_string(), "Tamil".to_string()],
            ..Default::default()
        };
        let prompt = build_prompt("a dog", &prefs);
        assert!(prompt.contains("PREFERRED LANGUAGES FOR SONGS: Hindi, Tamil"));
    }
}
