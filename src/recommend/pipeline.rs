//! End-to-end recommendation pipeline for one analysis run.
//!
//! Runs the scene reasoner, fans out catalog searches concurrently,
//! merges the results and attaches captions. Partial upstream failures
//! degrade; errors surface only when no usable response can be built.

use super::captions::{template_caption, CaptionWriter};
use super::merger::{merge_candidates, rank_with_captions};
use super::models::{Preferences, RecommendedTrack, SceneAnalysis};
use super::reasoner::{scene_from_caption, Reasoner};
use crate::captioner::ImageCaption;
use crate::catalog::{CatalogClient, CatalogError, TrackCandidate};
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Catalog queries are kept short so overlong keyword phrases cannot
/// blow past the search API's query limits.
const MAX_QUERY_CHARS: usize = 50;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Reasoner unavailable: {0}")]
    ReasonerUnavailable(String),
}

/// Tuning knobs for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Maximum tracks in the final response.
    pub limit: usize,
    /// Maximum keyword queries sent to the catalog per run.
    pub max_keyword_queries: usize,
    /// Catalog result page size per query.
    pub per_query_limit: usize,
    /// Popularity floor applied to keyword query results.
    pub min_popularity: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            limit: 8,
            max_keyword_queries: 4,
            per_query_limit: 10,
            min_popularity: 35,
        }
    }
}

#[derive(Debug)]
pub struct PipelineOutcome {
    pub scene: SceneAnalysis,
    pub results: Vec<RecommendedTrack>,
}

pub struct RecommendationPipeline {
    reasoner: Reasoner,
    caption_writer: CaptionWriter,
    catalog: Arc<dyn CatalogClient>,
    settings: PipelineSettings,
}

/// One catalog query. Keyword queries get the popularity floor,
/// verification queries for specific suggestions do not.
struct CatalogQuery {
    text: String,
    apply_popularity_floor: bool,
}

impl RecommendationPipeline {
    pub fn new(
        reasoner: Reasoner,
        caption_writer: CaptionWriter,
        catalog: Arc<dyn CatalogClient>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            reasoner,
            caption_writer,
            catalog,
            settings,
        }
    }

    pub fn reasoner_model(&self) -> &str {
        self.reasoner.model()
    }

    /// Run the full pipeline for one caption and effective preferences.
    pub async fn run(
        &self,
        caption: &ImageCaption,
        preferences: &Preferences,
    ) -> Result<PipelineOutcome, PipelineError> {
        let (scene, suggestions, reasoner_down) =
            match self.reasoner.analyze(caption, preferences).await {
                Ok((scene, suggestions)) => (scene, suggestions, false),
                Err(e) => {
                    warn!(error = %e, "Reasoner unavailable, degrading to caption keywords");
                    crate::server::metrics::record_degradation("reasoner");
                    (scene_from_caption(&caption.text), Vec::new(), true)
                }
            };

        let queries = self.build_queries(&scene, &suggestions);
        if queries.is_empty() {
            // No keywords and no suggestions means nothing to search for.
            return Err(PipelineError::ReasonerUnavailable(
                "no usable scene analysis could be derived".to_string(),
            ));
        }

        let candidates = self.search_catalog(&queries).await?;
        let merged = merge_candidates(&suggestions, candidates, self.settings.limit);

        let captions = if reasoner_down {
            // The LLM just failed for this run, do not hand it the
            // caption batch too.
            merged
                .iter()
                .map(|track| template_caption(&scene, track))
                .collect()
        } else {
            self.caption_writer.write_captions(&scene, &merged).await
        };

        let results = rank_with_captions(merged, captions);
        debug!(tracks = results.len(), "Pipeline run complete");

        Ok(PipelineOutcome { scene, results })
    }

    fn build_queries(
        &self,
        scene: &SceneAnalysis,
        suggestions: &[TrackCandidate],
    ) -> Vec<CatalogQuery> {
        let mut queries = Vec::new();

        for keyword in scene.keywords.iter().take(self.settings.max_keyword_queries) {
            let text = truncate_query(keyword);
            if !text.is_empty() {
                queries.push(CatalogQuery {
                    text,
                    apply_popularity_floor: true,
                });
            }
        }

        for suggestion in suggestions {
            let text = truncate_query(&format!(
                "track:{} artist:{}",
                suggestion.title, suggestion.artist
            ));
            queries.push(CatalogQuery {
                text,
                apply_popularity_floor: false,
            });
        }

        queries
    }

    async fn search_catalog(
        &self,
        queries: &[CatalogQuery],
    ) -> Result<Vec<TrackCandidate>, PipelineError> {
        let futures = queries.iter().map(|query| {
            let catalog = Arc::clone(&self.catalog);
            async move {
                let result = catalog.search(&query.text, self.settings.per_query_limit).await;
                (query, result)
            }
        });

        let mut candidates = Vec::new();
        let mut errors = 0usize;
        let mut last_error: Option<CatalogError> = None;

        for (query, result) in join_all(futures).await {
            match result {
                Ok(tracks) => {
                    let floor = if query.apply_popularity_floor {
                        self.settings.min_popularity
                    } else {
                        0
                    };
                    candidates.extend(tracks.into_iter().filter(|t| t.popularity_score >= floor));
                }
                Err(e) => {
                    warn!(query = %query.text, error = %e, "Catalog query failed");
                    errors += 1;
                    last_error = Some(e);
                }
            }
        }

        if errors == queries.len() {
            let reason = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "all queries failed".to_string());
            return Err(PipelineError::CatalogUnavailable(reason));
        }

        Ok(candidates)
    }
}

fn truncate_query(query: &str) -> String {
    let trimmed = query.trim();
    match trimmed.char_indices().nth(MAX_QUERY_CHARS) {
        Some((byte_index, _)) => trimmed[..byte_index].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captioner::ModelTier;
    use crate::catalog::TrackSource;
    use crate::llm::{
        CompletionOptions, CompletionResponse, FinishReason, LlmError, LlmProvider, Message,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    struct StubLlm {
        responses: Mutex<Vec<Result<String, ()>>>,
    }

    impl StubLlm {
        fn new(responses: Vec<Result<String, ()>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        fn name(&self) -> &str {
            "stub"
        }

        fn model(&self) -> &str {
            "stub-model"
        }

        async fn complete(
            &self,
            _messages: &[Message],
            _options: &CompletionOptions,
        ) -> Result<CompletionResponse, LlmError> {
            let mut responses = self.responses.lock().await;
            match responses.remove(0) {
                Ok(content) => Ok(CompletionResponse {
                    content,
                    finish_reason: FinishReason::Stop,
                    usage: None,
                }),
                Err(()) => Err(LlmError::Connection("stub down".to_string())),
            }
        }
    }

    struct StubCatalog {
        results: Vec<TrackCandidate>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl StubCatalog {
        fn with_results(results: Vec<TrackCandidate>) -> Self {
            Self {
                results,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                results: Vec::new(),
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CatalogClient for StubCatalog {
        async fn search(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<TrackCandidate>, CatalogError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(CatalogError::Connection("stub down".to_string()))
            } else {
                Ok(self.results.clone())
            }
        }
    }

    fn catalog_track(title: &str, artist: &str, id: &str, popularity: u32) -> TrackCandidate {
        TrackCandidate {
            title: title.to_string(),
            artist: artist.to_string(),
            external_id: id.to_string(),
            external_link: format!("https://open.spotify.com/track/{}", id),
            popularity_score: popularity,
            source: TrackSource::CatalogSearch,
        }
    }

    fn image_caption(text: &str) -> ImageCaption {
        ImageCaption {
            text: text.to_string(),
            model_used: ModelTier::Primary,
            confidence: None,
        }
    }

    const REASONER_RESPONSE: &str = r#"{
        "search_keywords": ["rainy night", "melancholy", "city walk", "lo-fi chill"],
        "scene_analysis": {"primary_mood": "melancholic", "setting_type": "urban"},
        "recommendations": [{"song_title": "Riders on the Storm", "artist": "The Doors"}]
    }"#;

    const CAPTIONS_RESPONSE: &str =
        r#"{"captions": [{"suggested_caption": "Storms and city lights #RainyDays"}]}"#;

    fn make_pipeline(
        llm_responses: Vec<Result<String, ()>>,
        catalog: StubCatalog,
        settings: PipelineSettings,
    ) -> RecommendationPipeline {
        let provider: Arc<dyn LlmProvider> = Arc::new(StubLlm::new(llm_responses));
        RecommendationPipeline::new(
            Reasoner::new(Arc::clone(&provider), CompletionOptions::default()),
            CaptionWriter::new(provider, CompletionOptions::default()),
            Arc::new(catalog),
            settings,
        )
    }

    #[tokio::test]
    async fn happy_path_promotes_verified_suggestion() {
        let catalog = StubCatalog::with_results(vec![
            catalog_track("Riders on the Storm", "The Doors", "d1", 70),
            catalog_track("Set Fire to the Rain", "Adele", "a1", 90),
        ]);
        let pipeline = make_pipeline(
            vec![
                Ok(REASONER_RESPONSE.to_string()),
                Ok(r#"{"captions": [{"suggested_caption": "c1"}, {"suggested_caption": "c2"}]}"#
                    .to_string()),
            ],
            catalog,
            PipelineSettings::default(),
        );

        let outcome = pipeline
            .run(&image_caption("person walking in rain"), &Preferences::default())
            .await
            .unwrap();

        assert_eq!(outcome.scene.mood, "melancholic");
        assert_eq!(outcome.results[0].title, "Riders on the Storm");
        assert_eq!(outcome.results[0].source, TrackSource::LlmSuggested);
        assert_eq!(outcome.results[0].rank, 1);
        assert_eq!(outcome.results[0].caption, "c1");
    }

    #[tokio::test]
    async fn reasoner_failure_degrades_to_caption_keywords() {
        let catalog = StubCatalog::with_results(vec![catalog_track("Rain", "Artist", "r1", 60)]);
        let pipeline = make_pipeline(vec![Err(())], catalog, PipelineSettings::default());

        let outcome = pipeline
            .run(&image_caption("person walking in heavy rain"), &Preferences::default())
            .await
            .unwrap();

        assert_eq!(outcome.scene.mood, "unknown");
        assert_eq!(outcome.results.len(), 1);
        // Templates are used without another LLM round trip.
        assert!(outcome.results[0].caption.contains("Rain"));
    }

    #[tokio::test]
    async fn all_catalog_failures_surface_as_unavailable() {
        let pipeline = make_pipeline(
            vec![Ok(REASONER_RESPONSE.to_string())],
            StubCatalog::failing(),
            PipelineSettings::default(),
        );

        let error = pipeline
            .run(&image_caption("a sunset"), &Preferences::default())
            .await
            .unwrap_err();
        assert!(matches!(error, PipelineError::CatalogUnavailable(_)));
    }

    #[tokio::test]
    async fn reasoner_down_with_unusable_caption_is_unavailable() {
        let catalog = StubCatalog::with_results(vec![]);
        let pipeline = make_pipeline(vec![Err(())], catalog, PipelineSettings::default());

        // Every caption word is a stopword or too short, so no keywords
        // and no suggestions remain.
        let error = pipeline
            .run(&image_caption("a of in"), &Preferences::default())
            .await
            .unwrap_err();
        assert!(matches!(error, PipelineError::ReasonerUnavailable(_)));
    }

    #[tokio::test]
    async fn keyword_results_below_popularity_floor_are_dropped() {
        let catalog = StubCatalog::with_results(vec![
            catalog_track("Obscure", "Nobody", "o1", 10),
            catalog_track("Popular", "Star", "p1", 80),
        ]);
        let pipeline = make_pipeline(
            vec![
                // No suggestions, keyword queries only.
                Ok(r#"{"search_keywords": ["rain"], "scene_analysis": {"primary_mood": "calm", "setting_type": "urban"}, "recommendations": []}"#.to_string()),
                Ok(CAPTIONS_RESPONSE.to_string()),
            ],
            catalog,
            PipelineSettings::default(),
        );

        let outcome = pipeline
            .run(&image_caption("rain"), &Preferences::default())
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].external_id, "p1");
    }

    #[tokio::test]
    async fn caption_generation_failure_falls_back_to_templates() {
        let catalog =
            StubCatalog::with_results(vec![catalog_track("Halo", "Beyonce", "h1", 80)]);
        let pipeline = make_pipeline(
            vec![Ok(REASONER_RESPONSE.to_string()), Err(())],
            catalog,
            PipelineSettings::default(),
        );

        let outcome = pipeline
            .run(&image_caption("a sunset"), &Preferences::default())
            .await
            .unwrap();

        assert!(!outcome.results.is_empty());
        for track in &outcome.results {
            assert!(track.caption.contains(&track.title));
        }
    }

    #[test]
    fn truncate_query_respects_char_limit() {
        let long = "x".repeat(200);
        assert_eq!(truncate_query(&long).chars().count(), MAX_QUERY_CHARS);
        assert_eq!(truncate_query("short"), "short");
    }
}
