//! The recommendation pipeline: scene reasoning, catalog reconciliation
//! and refinement over stored analyses.

mod captions;
mod merger;
mod models;
mod pipeline;
mod reasoner;
mod service;

pub use captions::{template_caption, CaptionWriter};
pub use merger::{merge_candidates, normalize_for_match, rank_with_captions};
pub use models::{Preferences, RecommendedTrack, SceneAnalysis};
pub use pipeline::{PipelineError, PipelineOutcome, PipelineSettings, RecommendationPipeline};
pub use reasoner::Reasoner;
pub use service::{AnalysisOutcome, AnalysisService, ServiceError};
