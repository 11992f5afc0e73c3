//! MusicVision Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod analysis_store;
pub mod captioner;
pub mod catalog;
pub mod config;
pub mod llm;
pub mod recommend;
pub mod server;

// Re-export commonly used types for convenience
pub use analysis_store::{AnalysisStore, InMemoryAnalysisStore};
pub use captioner::{Captioner, FallbackCaptioner, HfInferenceCaptioner, ImageCaption, ModelTier};
pub use catalog::{CatalogClient, SpotifyClient};
pub use llm::{LlmProvider, OpenAIProvider};
pub use recommend::AnalysisService;
pub use server::{run_server, RequestsLoggingLevel};
