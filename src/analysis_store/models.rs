use crate::captioner::ImageCaption;
use crate::recommend::{Preferences, RecommendedTrack, SceneAnalysis};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One stored analysis. The caption and original preferences never
/// change after creation; refinements append to
/// `accumulated_preferences` and overwrite the latest scene and results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub analysis_id: String,
    pub caption: ImageCaption,
    pub original_preferences: Preferences,
    pub accumulated_preferences: Vec<Preferences>,
    pub latest_scene: SceneAnalysis,
    pub latest_results: Vec<RecommendedTrack>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn new(
        caption: ImageCaption,
        original_preferences: Preferences,
        latest_scene: SceneAnalysis,
        latest_results: Vec<RecommendedTrack>,
    ) -> Self {
        let now = Utc::now();
        Self {
            analysis_id: Uuid::new_v4().to_string(),
            caption,
            original_preferences,
            accumulated_preferences: Vec::new(),
            latest_scene,
            latest_results,
            created_at: now,
            updated_at: now,
        }
    }

    /// Preferences in effect for the next refinement run.
    pub fn effective_preferences(&self) -> Preferences {
        Preferences::combined(
            &self.original_preferences,
            self.accumulated_preferences.iter(),
        )
    }
}
