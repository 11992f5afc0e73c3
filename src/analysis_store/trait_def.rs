use super::models::AnalysisRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Trait for analysis persistence.
///
/// `entry` hands out the record behind a per-record mutex so a caller
/// can hold one analysis locked across a refinement run without
/// blocking access to other analyses.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn insert(&self, record: AnalysisRecord) -> anyhow::Result<()>;

    async fn entry(&self, analysis_id: &str)
        -> anyhow::Result<Option<Arc<Mutex<AnalysisRecord>>>>;

    /// Remove analyses last updated before the cutoff. Returns how many
    /// were removed.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> anyhow::Result<usize>;

    async fn len(&self) -> anyhow::Result<usize>;
}
