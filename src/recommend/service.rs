//! Application service tying captioning, the recommendation pipeline
//! and the analysis store together.

use super::models::{Preferences, RecommendedTrack, SceneAnalysis};
use super::pipeline::{PipelineError, RecommendationPipeline};
use crate::analysis_store::{AnalysisRecord, AnalysisStore};
use crate::captioner::{CaptionerError, FallbackCaptioner, ImageCaption};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Captioning unavailable: {0}")]
    CaptioningUnavailable(String),

    #[error("Analysis not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Result of one analysis or refinement run.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub analysis_id: String,
    pub caption: ImageCaption,
    pub scene: SceneAnalysis,
    pub results: Vec<RecommendedTrack>,
}

pub struct AnalysisService {
    captioner: FallbackCaptioner,
    pipeline: RecommendationPipeline,
    store: Arc<dyn AnalysisStore>,
}

impl AnalysisService {
    pub fn new(
        captioner: FallbackCaptioner,
        pipeline: RecommendationPipeline,
        store: Arc<dyn AnalysisStore>,
    ) -> Self {
        Self {
            captioner,
            pipeline,
            store,
        }
    }

    /// Models in the captioning fallback chain, for health reporting.
    pub fn captioner_models(&self) -> Vec<&str> {
        self.captioner.model_names()
    }

    /// Model backing the scene reasoner, for health reporting.
    pub fn reasoner_model(&self) -> &str {
        self.pipeline.reasoner_model()
    }

    /// Caption the image, run the pipeline and store the result under a
    /// fresh analysis id.
    pub async fn analyze(
        &self,
        image: &[u8],
        preferences: Preferences,
    ) -> Result<AnalysisOutcome, ServiceError> {
        let caption = self
            .captioner
            .caption(image)
            .await
            .map_err(|e: CaptionerError| ServiceError::CaptioningUnavailable(e.to_string()))?;
        info!(caption = %caption.text, model = ?caption.model_used, "Image captioned");

        let outcome = self.pipeline.run(&caption, &preferences).await?;

        let record = AnalysisRecord::new(
            caption.clone(),
            preferences,
            outcome.scene.clone(),
            outcome.results.clone(),
        );
        let analysis_id = record.analysis_id.clone();
        self.store.insert(record).await?;
        info!(analysis_id = %analysis_id, tracks = outcome.results.len(), "Analysis stored");

        Ok(AnalysisOutcome {
            analysis_id,
            caption,
            scene: outcome.scene,
            results: outcome.results,
        })
    }

    /// Re-run recommendations for a stored analysis with an additional
    /// preference round merged in.
    ///
    /// The record stays locked for the whole run, so concurrent
    /// refinements of the same analysis are serialized and each sees
    /// the previous round's preferences.
    pub async fn refine(
        &self,
        analysis_id: &str,
        additional: Preferences,
    ) -> Result<AnalysisOutcome, ServiceError> {
        let entry = self
            .store
            .entry(analysis_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(analysis_id.to_string()))?;

        let mut record = entry.lock().await;
        let accumulated = record.effective_preferences();
        let effective = Preferences::combined(&accumulated, std::iter::once(&additional));

        let outcome = self.pipeline.run(&record.caption, &effective).await?;

        // Mutate only once the run has succeeded.
        record.accumulated_preferences.push(additional);
        record.latest_scene = outcome.scene.clone();
        record.latest_results = outcome.results.clone();
        record.updated_at = Utc::now();
        info!(analysis_id = %analysis_id, rounds = record.accumulated_preferences.len(), "Analysis refined");

        Ok(AnalysisOutcome {
            analysis_id: record.analysis_id.clone(),
            caption: record.caption.clone(),
            scene: outcome.scene,
            results: outcome.results,
        })
    }

    /// Fetch the stored state of an analysis.
    pub async fn results(&self, analysis_id: &str) -> Result<AnalysisRecord, ServiceError> {
        let entry = self
            .store
            .entry(analysis_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(analysis_id.to_string()))?;
        let record = entry.lock().await;
        Ok(record.clone())
    }
}
