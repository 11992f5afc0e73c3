//! Storage of completed analyses for later retrieval and refinement.

mod models;
mod store;
mod trait_def;

pub use models::AnalysisRecord;
pub use store::InMemoryAnalysisStore;
pub use trait_def::AnalysisStore;
