//! Redis storage backend for distributed checkpoint persistence
//!
//! [`RedisDurableStorage`] implements the [`DurableStorage`] port over a
//! networked Redis instance, adding a metadata projection for cheap listing
//! and a per-status secondary index for cheap filtering.
//!
//! # Physical layout
//!
//! Per execution identifier `id` (default prefix `durable_exec:`):
//!
//! ```text
//! durable_exec:{id}            -> full JSON-encoded record       (string)
//! durable_exec:meta:{id}       -> metadata projection            (hash)
//! durable_exec:index:{status}  -> execution ids in that status   (set)
//! ```
//!
//! # Consistency
//!
//! `save_state` updates all three keys in a single pipelined request. The
//! pipeline is a best-effort batched submission, not a multi-key transaction:
//! a crash between batches can leave the metadata or index temporarily
//! inconsistent with the primary record. [`rebuild_indexes`](RedisDurableStorage::rebuild_indexes)
//! repairs exactly this class of drift and should be run after abnormal
//! termination.
//!
//! # Example
//!
//! ```rust,no_run
//! use durable_exec::{DurableStorage, RedisDurableStorage};
//!
//! # #[tokio::main]
//! # async fn main() -> durable_exec::Result<()> {
//! let storage = RedisDurableStorage::connect("redis://127.0.0.1:6379/0").await?;
//! let failed = storage
//!     .list_executions(Some(durable_exec::ExecutionStatus::Failed), Some(10))
//!     .await?;
//! println!("{} failed executions", failed.len());
//! # Ok(())
//! # }
//! ```

use crate::{
    error::{DurableError, Result},
    state::{parse_utc_timestamp, ExecutionMetadata, ExecutionState, ExecutionStatus},
    traits::{DurableStorage, StorageStats},
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::collections::HashMap;

/// Default key prefix for all execution state keys
pub const DEFAULT_PREFIX: &str = "durable_exec:";

/// Redis-backed checkpoint storage
///
/// The underlying multiplexed connection is cheap to clone and safe to share
/// across tasks; all I/O is async and never blocks the calling scheduler.
#[derive(Debug, Clone)]
pub struct RedisDurableStorage {
    conn: MultiplexedConnection,
    prefix: String,
}

impl RedisDurableStorage {
    /// Connect with the default key prefix
    ///
    /// Fails fast with [`DurableError::Connection`] if the server is
    /// unreachable, rather than degrading silently on first use.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_prefix(url, DEFAULT_PREFIX).await
    }

    /// Connect with a custom key prefix
    pub async fn connect_with_prefix(url: &str, prefix: impl Into<String>) -> Result<Self> {
        let connect_err = |source| DurableError::Connection {
            addr: url.to_string(),
            source,
        };

        let client = Client::open(url).map_err(connect_err)?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(connect_err)?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(connect_err)?;

        Ok(Self {
            conn,
            prefix: prefix.into(),
        })
    }

    fn key(&self, execution_id: &str) -> String {
        primary_key(&self.prefix, execution_id)
    }

    fn meta_key(&self, execution_id: &str) -> String {
        meta_key(&self.prefix, execution_id)
    }

    fn index_key(&self, status: ExecutionStatus) -> String {
        index_key(&self.prefix, status)
    }

    /// Collect every metadata key currently in the store
    async fn scan_meta_keys(&self) -> Result<Vec<String>> {
        let pattern = format!("{}meta:*", self.prefix);
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        {
            let mut iter = conn.scan_match::<_, String>(&pattern).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    fn execution_id_of(&self, meta_key: &str) -> String {
        meta_key
            .strip_prefix(&format!("{}meta:", self.prefix))
            .unwrap_or(meta_key)
            .to_string()
    }

    /// Apply an expiry to the primary and metadata keys for an execution
    ///
    /// The store auto-evicts the record after `ttl_seconds`, independent of
    /// explicit cleanup. The status index entry is not expired; run
    /// [`rebuild_indexes`](Self::rebuild_indexes) to drop entries for evicted
    /// records.
    pub async fn set_ttl(&self, execution_id: &str, ttl_seconds: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.expire(self.key(execution_id), ttl_seconds).ignore();
        pipe.expire(self.meta_key(execution_id), ttl_seconds)
            .ignore();
        let () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    /// Delete every status index set
    pub async fn clear_all_indexes(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for status in ExecutionStatus::ALL {
            pipe.del(self.index_key(status)).ignore();
        }
        let () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    /// Rebuild status indexes from the stored metadata projections
    ///
    /// Clears all index sets, then repopulates them by scanning every
    /// metadata key and reading its current status. This is the documented
    /// recovery step for index drift caused by crashes between pipeline
    /// batches. Returns the number of executions re-indexed.
    pub async fn rebuild_indexes(&self) -> Result<usize> {
        self.clear_all_indexes().await?;

        let mut conn = self.conn.clone();
        let mut reindexed = 0;
        for meta_key in self.scan_meta_keys().await? {
            let hash: HashMap<String, String> = conn.hgetall(&meta_key).await?;
            let fallback_id = self.execution_id_of(&meta_key);
            let Some(metadata) = ExecutionMetadata::from_hash(&fallback_id, &hash) else {
                continue;
            };

            let _: i64 = conn
                .sadd(self.index_key(metadata.status), &metadata.execution_id)
                .await?;
            reindexed += 1;
        }

        tracing::debug!(reindexed, "status indexes rebuilt");
        Ok(reindexed)
    }
}

#[async_trait]
impl DurableStorage for RedisDurableStorage {
    async fn save_state(&self, execution_id: &str, mut state: ExecutionState) -> Result<()> {
        state.saved_at = Some(Utc::now());
        state.execution_id = Some(execution_id.to_string());

        let payload = serde_json::to_string(&state)?;
        let hash = state.metadata(execution_id).to_hash();

        let mut conn = self.conn.clone();

        // Previous status, so the stale index entry can be dropped in the
        // same batch when the status changed.
        let previous: Option<String> = conn.hget(self.meta_key(execution_id), "status").await?;
        let previous_status = previous.and_then(|s| s.parse::<ExecutionStatus>().ok());

        let mut pipe = redis::pipe();
        pipe.set(self.key(execution_id), payload).ignore();
        pipe.hset_multiple(self.meta_key(execution_id), &hash)
            .ignore();
        pipe.sadd(self.index_key(state.status), execution_id)
            .ignore();
        if let Some(previous) = previous_status {
            if previous != state.status {
                pipe.srem(self.index_key(previous), execution_id).ignore();
            }
        }

        let saved: redis::RedisResult<()> = pipe.query_async(&mut conn).await;
        if let Err(e) = saved {
            tracing::error!(execution_id, error = %e, "redis save failed");
            return Err(e.into());
        }

        tracing::debug!(
            execution_id,
            step_index = state.step_index,
            status = %state.status,
            "checkpoint persisted"
        );
        Ok(())
    }

    async fn load_state(&self, execution_id: &str) -> Result<Option<ExecutionState>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.key(execution_id)).await?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                // Treated as absent so a corrupted checkpoint does not crash
                // the caller; surfaced here for operators.
                tracing::warn!(execution_id, error = %e, "discarding undecodable checkpoint record");
                Ok(None)
            }
        }
    }

    async fn delete_state(&self, execution_id: &str) -> Result<bool> {
        // Load first to learn which status index holds the identifier.
        let existing = self.load_state(execution_id).await?;

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.del(self.key(execution_id));
        pipe.del(self.meta_key(execution_id));
        if let Some(state) = &existing {
            pipe.srem(self.index_key(state.status), execution_id);
        }

        let removed: Vec<i64> = pipe.query_async(&mut conn).await?;
        Ok(removed.iter().any(|n| *n > 0))
    }

    async fn list_executions(
        &self,
        status: Option<ExecutionStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<ExecutionMetadata>> {
        let mut conn = self.conn.clone();

        let execution_ids: Vec<String> = match status {
            // Index set lookup: O(matches).
            Some(status) => conn.smembers(self.index_key(status)).await?,
            // Prefix scan over metadata keys: O(all records).
            None => self
                .scan_meta_keys()
                .await?
                .iter()
                .map(|k| self.execution_id_of(k))
                .collect(),
        };

        let mut result = Vec::with_capacity(execution_ids.len());
        for execution_id in execution_ids {
            let hash: HashMap<String, String> =
                conn.hgetall(self.meta_key(&execution_id)).await?;
            if let Some(metadata) = ExecutionMetadata::from_hash(&execution_id, &hash) {
                result.push(metadata);
            }
        }

        result.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    async fn cleanup_old_executions(&self, older_than_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(older_than_days);
        let mut conn = self.conn.clone();
        let mut deleted = 0;

        for status in ExecutionStatus::TERMINAL {
            let execution_ids: Vec<String> = conn.smembers(self.index_key(status)).await?;

            for execution_id in execution_ids {
                let hash: HashMap<String, String> =
                    conn.hgetall(self.meta_key(&execution_id)).await?;

                // Skip records whose timestamp is missing or unparsable
                // rather than failing the whole sweep.
                let Some(timestamp) = hash
                    .get("timestamp")
                    .filter(|s| !s.is_empty())
                    .and_then(|s| parse_utc_timestamp(s))
                else {
                    continue;
                };

                if timestamp < cutoff && self.delete_state(&execution_id).await? {
                    deleted += 1;
                }
            }
        }

        tracing::debug!(deleted, older_than_days, "retention cleanup finished");
        Ok(deleted)
    }

    async fn get_stats(&self) -> Result<StorageStats> {
        let mut conn = self.conn.clone();
        let mut stats = StorageStats::new("redis");

        for status in ExecutionStatus::ALL {
            let count: usize = conn.scard(self.index_key(status)).await?;
            if count > 0 {
                stats.by_status.insert(status, count);
            }
        }
        stats.total_executions = stats.by_status.values().sum();
        Ok(stats)
    }
}

fn primary_key(prefix: &str, execution_id: &str) -> String {
    format!("{prefix}{execution_id}")
}

fn meta_key(prefix: &str, execution_id: &str) -> String {
    format!("{prefix}meta:{execution_id}")
}

fn index_key(prefix: &str, status: ExecutionStatus) -> String {
    format!("{prefix}index:{status}")
}
