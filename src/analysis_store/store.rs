use super::models::AnalysisRecord;
use super::trait_def::AnalysisStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// In-memory analysis store. Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryAnalysisStore {
    records: RwLock<HashMap<String, Arc<Mutex<AnalysisRecord>>>>,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnalysisStore for InMemoryAnalysisStore {
    async fn insert(&self, record: AnalysisRecord) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        records.insert(record.analysis_id.clone(), Arc::new(Mutex::new(record)));
        Ok(())
    }

    async fn entry(
        &self,
        analysis_id: &str,
    ) -> anyhow::Result<Option<Arc<Mutex<AnalysisRecord>>>> {
        let records = self.records.read().await;
        Ok(records.get(analysis_id).cloned())
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> anyhow::Result<usize> {
        // Snapshot under a read lock so lookups and inserts stay
        // responsive while staleness is checked.
        let candidates: Vec<(String, Arc<Mutex<AnalysisRecord>>)> = {
            let records = self.records.read().await;
            records
                .iter()
                .map(|(id, record)| (id.clone(), Arc::clone(record)))
                .collect()
        };

        let mut expired = Vec::new();
        for (id, record) in candidates {
            // A locked record has a refinement in flight that will
            // refresh updated_at; skip it and let the next tick decide.
            match record.try_lock() {
                Ok(guard) if guard.updated_at < cutoff => expired.push(id),
                _ => {}
            }
        }

        let mut removed = 0;
        if !expired.is_empty() {
            let mut records = self.records.write().await;
            for id in &expired {
                let still_stale = records.get(id).is_some_and(|record| {
                    record
                        .try_lock()
                        .map(|guard| guard.updated_at < cutoff)
                        .unwrap_or(false)
                });
                if still_stale {
                    records.remove(id);
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            debug!(pruned = removed, "Pruned expired analyses");
        }
        Ok(removed)
    }

    async fn len(&self) -> anyhow::Result<usize> {
        Ok(self.records.read().await.len())
    }
}
