//! Extensible storage trait for checkpoint persistence backends
//!
//! This module defines **[`DurableStorage`]** - the abstract contract every
//! backend must satisfy to persist, retrieve, enumerate, and delete checkpoint
//! records keyed by an execution identifier. The crate ships two
//! implementations: [`InMemoryDurableStorage`](crate::memory::InMemoryDurableStorage)
//! for development and tests, and
//! [`RedisDurableStorage`](crate::redis::RedisDurableStorage) for networked
//! deployments. Downstream projects can implement the trait over any store
//! (a single file, SQLite, S3, ...) with weaker indexing guarantees.
//!
//! # Contract
//!
//! - `save_state` is an **upsert**: it stamps `saved_at` with the current time
//!   before persisting and fully replaces any prior record under the same
//!   identifier.
//! - `load_state` returns `Ok(None)` for a missing key - absence is never an
//!   error.
//! - `delete_state` removes the record and every derived artifact (metadata
//!   projection, status index membership) and reports whether anything was
//!   actually removed.
//! - `list_executions` returns metadata projections ordered most-recently
//!   captured first; the filtered and unfiltered paths must produce
//!   identically shaped results.
//! - `cleanup_old_executions` only touches terminal-status records and must
//!   skip, not fail on, records with missing or unparsable timestamps.
//!
//! # Thread safety
//!
//! Implementations must be `Send + Sync`; the backend connection is a shared
//! resource. The trait provides no mutual exclusion across concurrent writers
//! to the same identifier - see [`DurableExecution`](crate::execution::DurableExecution)
//! for the per-identifier exclusive section at the manager boundary.
//!
//! # Example: custom backend
//!
//! ```rust,ignore
//! use durable_exec::{DurableStorage, ExecutionState, ExecutionMetadata, ExecutionStatus, StorageStats, Result};
//! use async_trait::async_trait;
//!
//! struct SqliteDurableStorage { pool: sqlx::SqlitePool }
//!
//! #[async_trait]
//! impl DurableStorage for SqliteDurableStorage {
//!     async fn save_state(&self, execution_id: &str, state: ExecutionState) -> Result<()> {
//!         // INSERT ... ON CONFLICT(execution_id) DO UPDATE ...
//!         Ok(())
//!     }
//!     // ... remaining methods ...
//! #   async fn load_state(&self, _: &str) -> Result<Option<ExecutionState>> { Ok(None) }
//! #   async fn delete_state(&self, _: &str) -> Result<bool> { Ok(false) }
//! #   async fn list_executions(&self, _: Option<ExecutionStatus>, _: Option<usize>) -> Result<Vec<ExecutionMetadata>> { Ok(vec![]) }
//! #   async fn cleanup_old_executions(&self, _: i64) -> Result<usize> { Ok(0) }
//! #   async fn get_stats(&self) -> Result<StorageStats> { Ok(StorageStats::new("sqlite")) }
//! }
//! ```

use crate::{
    error::Result,
    state::{ExecutionMetadata, ExecutionState, ExecutionStatus},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Aggregate statistics for a storage backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStats {
    /// Backend name (`"redis"`, `"memory"`, ...)
    pub backend: String,
    /// Total number of live execution records
    pub total_executions: usize,
    /// Record counts per status; statuses with zero records are omitted
    pub by_status: HashMap<ExecutionStatus, usize>,
}

impl StorageStats {
    /// Create empty stats for a named backend
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            total_executions: 0,
            by_status: HashMap::new(),
        }
    }
}

/// Abstract contract for checkpoint persistence backends
#[async_trait]
pub trait DurableStorage: Send + Sync {
    /// Upsert the record for `execution_id`, fully replacing any prior record
    ///
    /// Implementations stamp `saved_at` with the current time and
    /// `execution_id` with the owning identifier before persisting.
    async fn save_state(&self, execution_id: &str, state: ExecutionState) -> Result<()>;

    /// Load the latest persisted record, or `Ok(None)` if absent
    ///
    /// A stored record that cannot be decoded is treated as absent; backends
    /// log the occurrence so corruption is visible to operators.
    async fn load_state(&self, execution_id: &str) -> Result<Option<ExecutionState>>;

    /// Remove the record and all derived artifacts
    ///
    /// Returns `true` if anything was actually removed.
    async fn delete_state(&self, execution_id: &str) -> Result<bool>;

    /// Enumerate metadata projections, newest capture first
    ///
    /// When `status` is given, only matching executions are returned; `limit`
    /// truncates the result after sorting.
    async fn list_executions(
        &self,
        status: Option<ExecutionStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<ExecutionMetadata>>;

    /// Delete terminal-status records whose capture timestamp predates the cutoff
    ///
    /// Records with missing or unparsable timestamps are skipped. Returns the
    /// number of executions removed.
    async fn cleanup_old_executions(&self, older_than_days: i64) -> Result<usize>;

    /// Aggregate statistics for monitoring
    async fn get_stats(&self) -> Result<StorageStats>;
}
