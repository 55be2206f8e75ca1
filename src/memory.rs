//! In-memory storage backend for development and testing
//!
//! [`InMemoryDurableStorage`] is the reference implementation of the
//! [`DurableStorage`] trait: a thread-safe map of execution identifier to the
//! single live [`ExecutionState`] record. All operations run in memory, data
//! is lost on restart, and there is no secondary indexing - listing is a full
//! scan, which is the weaker-guarantee profile the storage contract permits
//! for local backends.
//!
//! Use it for unit tests, prototypes, and short-lived workflows. For
//! deployments that must survive a process restart, use
//! [`RedisDurableStorage`](crate::redis::RedisDurableStorage) or a custom
//! backend.
//!
//! # Example
//!
//! ```rust
//! use durable_exec::{DurableStorage, ExecutionState, InMemoryDurableStorage};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> durable_exec::Result<()> {
//! let storage = InMemoryDurableStorage::new();
//! storage
//!     .save_state("exec-1", ExecutionState::new(json!({}), json!({})))
//!     .await?;
//!
//! assert!(storage.load_state("exec-1").await?.is_some());
//! assert!(storage.delete_state("exec-1").await?);
//! assert!(storage.load_state("exec-1").await?.is_none());
//! # Ok(())
//! # }
//! ```

use crate::{
    error::Result,
    state::{ExecutionMetadata, ExecutionState, ExecutionStatus},
    traits::{DurableStorage, StorageStats},
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory checkpoint storage
#[derive(Debug, Clone, Default)]
pub struct InMemoryDurableStorage {
    records: Arc<RwLock<HashMap<String, ExecutionState>>>,
}

impl InMemoryDurableStorage {
    /// Create an empty in-memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live execution records
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Remove all records (useful for test isolation)
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl DurableStorage for InMemoryDurableStorage {
    async fn save_state(&self, execution_id: &str, mut state: ExecutionState) -> Result<()> {
        state.saved_at = Some(Utc::now());
        state.execution_id = Some(execution_id.to_string());
        self.records
            .write()
            .await
            .insert(execution_id.to_string(), state);
        Ok(())
    }

    async fn load_state(&self, execution_id: &str) -> Result<Option<ExecutionState>> {
        Ok(self.records.read().await.get(execution_id).cloned())
    }

    async fn delete_state(&self, execution_id: &str) -> Result<bool> {
        Ok(self.records.write().await.remove(execution_id).is_some())
    }

    async fn list_executions(
        &self,
        status: Option<ExecutionStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<ExecutionMetadata>> {
        let records = self.records.read().await;
        let mut result: Vec<ExecutionMetadata> = records
            .iter()
            .filter(|(_, state)| status.map_or(true, |s| state.status == s))
            .map(|(id, state)| state.metadata(id))
            .collect();

        result.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    async fn cleanup_old_executions(&self, older_than_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(older_than_days);
        let mut records = self.records.write().await;

        let expired: Vec<String> = records
            .iter()
            .filter(|(_, state)| state.status.is_terminal() && state.timestamp < cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            records.remove(id);
        }
        Ok(expired.len())
    }

    async fn get_stats(&self) -> Result<StorageStats> {
        let records = self.records.read().await;
        let mut stats = StorageStats::new("memory");
        stats.total_executions = records.len();
        for state in records.values() {
            *stats.by_status.entry(state.status).or_insert(0) += 1;
        }
        Ok(stats)
    }
}
