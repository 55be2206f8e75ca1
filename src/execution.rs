//! Durable execution manager
//!
//! [`DurableExecution`] is the orchestration-facing entry point of the crate.
//! It owns an execution identifier, drives the [`StateSerializer`] and a
//! [`DurableStorage`] backend to save, load, advance, and finalize
//! checkpoints, and exposes both async and blocking call conventions.
//!
//! # Lifecycle
//!
//! The execution engine calls [`save_checkpoint`](DurableExecution::save_checkpoint)
//! after each step. On resume it calls
//! [`load_checkpoint`](DurableExecution::load_checkpoint) and continues from
//! the recorded step instead of from scratch. On success it calls
//! [`mark_completed`](DurableExecution::mark_completed) - which deletes the
//! record outright when auto-cleanup is enabled - and on failure
//! [`mark_failed`](DurableExecution::mark_failed).
//!
//! # Blocking variants
//!
//! Every operation has a `_blocking` companion that drives the same future to
//! completion on the calling thread. The two are observably equivalent - same
//! record shape, same errors - except that a blocking variant invoked from
//! inside a Tokio runtime fails immediately with
//! [`DurableError::BlockingInAsyncContext`] rather than deadlocking or
//! nesting schedulers.
//!
//! # Example
//!
//! ```rust
//! use durable_exec::{DurableExecution, ExecutionStatus, InMemoryDurableStorage};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> durable_exec::Result<()> {
//! let storage = Arc::new(InMemoryDurableStorage::new());
//! let durable = DurableExecution::new(storage.clone());
//!
//! durable
//!     .save_checkpoint(&json!({"goal": "sync"}), &json!({}), 0, "fetch", ExecutionStatus::Running, None, None)
//!     .await?;
//!
//! let loaded = durable.load_checkpoint::<serde_json::Value>().await?.unwrap();
//! assert_eq!(loaded.step_name, "fetch");
//!
//! durable.mark_completed().await?; // auto-cleanup deletes the record
//! assert!(durable.load_checkpoint::<serde_json::Value>().await?.is_none());
//! # Ok(())
//! # }
//! ```

use crate::{
    error::{DurableError, Result},
    serializer::{LoadedCheckpoint, StateSerializer},
    state::{generate_execution_id, ExecutionMetadata, ExecutionStatus},
    traits::DurableStorage,
};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Drive a future to completion on the calling thread
///
/// Fails fast when invoked from inside a Tokio runtime - blocking there would
/// stall the scheduler, and building a nested runtime panics.
fn run_blocking<F, T>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(DurableError::BlockingInAsyncContext);
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(future)
}

/// Manages durable execution for step-based tasks
///
/// Writes for the owned identifier are serialized through a per-instance
/// lock, so read-modify-write sequences (`mark_completed`, `mark_failed`)
/// cannot lose updates to a concurrent save through the same instance.
/// Writers in other processes remain unsynchronized.
pub struct DurableExecution {
    storage: Arc<dyn DurableStorage>,
    execution_id: String,
    auto_cleanup: bool,
    serializer: StateSerializer,
    write_lock: Mutex<()>,
}

impl DurableExecution {
    /// Create a manager with a generated execution identifier
    ///
    /// Auto-cleanup is enabled by default: `mark_completed` deletes the
    /// record rather than retaining a `completed` one.
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self {
            storage,
            execution_id: generate_execution_id(),
            auto_cleanup: true,
            serializer: StateSerializer::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Use a caller-supplied execution identifier for deterministic resumption
    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = execution_id.into();
        self
    }

    /// Control whether `mark_completed` deletes the record
    pub fn with_auto_cleanup(mut self, auto_cleanup: bool) -> Self {
        self.auto_cleanup = auto_cleanup;
        self
    }

    /// The identifier naming this execution, immutable for the instance lifetime
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Whether successful completion deletes the record
    pub fn auto_cleanup(&self) -> bool {
        self.auto_cleanup
    }

    /// Persist a checkpoint for the step just processed
    ///
    /// Safe to call after every step, including the first; each save fully
    /// replaces the prior record for this identifier. Storage errors
    /// propagate unchanged - the manager performs no retry.
    #[allow(clippy::too_many_arguments)]
    pub async fn save_checkpoint<T, C>(
        &self,
        task: &T,
        context: &C,
        step_index: u64,
        step_name: &str,
        status: ExecutionStatus,
        error: Option<String>,
        agent_state: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<()>
    where
        T: Serialize + Sync,
        C: Serialize + Sync,
    {
        let state = self.serializer.serialize_state(
            task,
            context,
            step_index,
            step_name,
            status,
            error,
            agent_state,
        )?;

        let _guard = self.write_lock.lock().await;
        self.storage.save_state(&self.execution_id, state).await?;

        tracing::debug!(
            execution_id = %self.execution_id,
            step_index,
            step_name,
            "checkpoint saved"
        );
        Ok(())
    }

    /// Blocking variant of [`save_checkpoint`](Self::save_checkpoint)
    #[allow(clippy::too_many_arguments)]
    pub fn save_checkpoint_blocking<T, C>(
        &self,
        task: &T,
        context: &C,
        step_index: u64,
        step_name: &str,
        status: ExecutionStatus,
        error: Option<String>,
        agent_state: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<()>
    where
        T: Serialize + Sync,
        C: Serialize + Sync,
    {
        run_blocking(self.save_checkpoint(
            task,
            context,
            step_index,
            step_name,
            status,
            error,
            agent_state,
        ))
    }

    /// Load the last checkpoint, or `Ok(None)` if none exists
    ///
    /// The task comes back fully reconstructed; the context is returned as
    /// structured data and must be rebuilt by the caller with live engine
    /// references.
    pub async fn load_checkpoint<T>(&self) -> Result<Option<LoadedCheckpoint<T>>>
    where
        T: DeserializeOwned,
    {
        let Some(state) = self.storage.load_state(&self.execution_id).await? else {
            return Ok(None);
        };

        let loaded = self.serializer.deserialize_state(state)?;
        tracing::debug!(
            execution_id = %self.execution_id,
            step_index = loaded.step_index,
            step_name = %loaded.step_name,
            "checkpoint loaded"
        );
        Ok(Some(loaded))
    }

    /// Blocking variant of [`load_checkpoint`](Self::load_checkpoint)
    pub fn load_checkpoint_blocking<T>(&self) -> Result<Option<LoadedCheckpoint<T>>>
    where
        T: DeserializeOwned,
    {
        run_blocking(self.load_checkpoint())
    }

    /// Mark this execution as completed
    ///
    /// With auto-cleanup enabled the record is deleted outright and a
    /// subsequent load returns `None`. With auto-cleanup disabled the record
    /// is re-saved with `status = completed` and stays visible to
    /// `load`/`list`. Callers that need post-completion visibility must
    /// disable auto-cleanup.
    pub async fn mark_completed(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if self.auto_cleanup {
            self.storage.delete_state(&self.execution_id).await?;
            tracing::debug!(execution_id = %self.execution_id, "execution completed and cleaned up");
        } else if let Some(state) = self.storage.load_state(&self.execution_id).await? {
            let state = state.with_status(ExecutionStatus::Completed);
            self.storage.save_state(&self.execution_id, state).await?;
            tracing::debug!(execution_id = %self.execution_id, "execution marked as completed");
        }
        Ok(())
    }

    /// Blocking variant of [`mark_completed`](Self::mark_completed)
    pub fn mark_completed_blocking(&self) -> Result<()> {
        run_blocking(self.mark_completed())
    }

    /// Mark this execution as failed with an error description
    ///
    /// A no-op when no record exists yet - there is nothing to mark.
    pub async fn mark_failed(&self, error: impl Into<String>) -> Result<()> {
        let error = error.into();
        let _guard = self.write_lock.lock().await;

        if let Some(state) = self.storage.load_state(&self.execution_id).await? {
            let state = state
                .with_status(ExecutionStatus::Failed)
                .with_error(error.clone());
            self.storage.save_state(&self.execution_id, state).await?;
            tracing::error!(execution_id = %self.execution_id, error = %error, "execution failed");
        }
        Ok(())
    }

    /// Blocking variant of [`mark_failed`](Self::mark_failed)
    pub fn mark_failed_blocking(&self, error: impl Into<String>) -> Result<()> {
        run_blocking(self.mark_failed(error.into()))
    }

    /// Metadata for this execution, or `Ok(None)` if no record exists
    pub async fn get_execution_info(&self) -> Result<Option<ExecutionMetadata>> {
        Ok(self
            .storage
            .load_state(&self.execution_id)
            .await?
            .map(|state| state.metadata(&self.execution_id)))
    }

    /// Blocking variant of [`get_execution_info`](Self::get_execution_info)
    pub fn get_execution_info_blocking(&self) -> Result<Option<ExecutionMetadata>> {
        run_blocking(self.get_execution_info())
    }

    /// List executions in a storage backend, optionally filtered by status
    pub async fn list_all_executions(
        storage: &dyn DurableStorage,
        status: Option<ExecutionStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<ExecutionMetadata>> {
        storage.list_executions(status, limit).await
    }

    /// Blocking variant of [`list_all_executions`](Self::list_all_executions)
    pub fn list_all_executions_blocking(
        storage: &dyn DurableStorage,
        status: Option<ExecutionStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<ExecutionMetadata>> {
        run_blocking(Self::list_all_executions(storage, status, limit))
    }

    /// Rehydrate a manager for an existing execution identifier
    ///
    /// Returns `Ok(None)` when no record exists for the identifier. The
    /// rehydrated instance has auto-cleanup disabled so that inspecting a
    /// loaded execution cannot silently destroy its state.
    pub async fn load_by_id(
        execution_id: impl Into<String>,
        storage: Arc<dyn DurableStorage>,
    ) -> Result<Option<Self>> {
        let execution_id = execution_id.into();
        if storage.load_state(&execution_id).await?.is_none() {
            return Ok(None);
        }

        Ok(Some(
            Self::new(storage)
                .with_execution_id(execution_id)
                .with_auto_cleanup(false),
        ))
    }

    /// Blocking variant of [`load_by_id`](Self::load_by_id)
    pub fn load_by_id_blocking(
        execution_id: impl Into<String>,
        storage: Arc<dyn DurableStorage>,
    ) -> Result<Option<Self>> {
        run_blocking(Self::load_by_id(execution_id.into(), storage))
    }
}

impl std::fmt::Debug for DurableExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableExecution")
            .field("execution_id", &self.execution_id)
            .field("auto_cleanup", &self.auto_cleanup)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDurableStorage;
    use serde_json::json;

    fn manager() -> (Arc<InMemoryDurableStorage>, DurableExecution) {
        let storage = Arc::new(InMemoryDurableStorage::new());
        let durable = DurableExecution::new(storage.clone());
        (storage, durable)
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let (_, durable) = manager();
        durable
            .save_checkpoint(
                &json!({"goal": "sync"}),
                &json!({"outputs": []}),
                0,
                "fetch",
                ExecutionStatus::Running,
                None,
                None,
            )
            .await
            .unwrap();

        let loaded = durable
            .load_checkpoint::<serde_json::Value>()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.step_index, 0);
        assert_eq!(loaded.step_name, "fetch");
        assert_eq!(loaded.status, ExecutionStatus::Running);
        assert_eq!(loaded.context_data, json!({"outputs": []}));
    }

    #[tokio::test]
    async fn test_load_without_record_is_none() {
        let (_, durable) = manager();
        assert!(durable
            .load_checkpoint::<serde_json::Value>()
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_mark_failed_without_record_is_noop() {
        let (storage, durable) = manager();
        durable.mark_failed("boom").await.unwrap();
        assert_eq!(storage.count().await, 0);
    }

    #[tokio::test]
    async fn test_mark_completed_retains_when_auto_cleanup_disabled() {
        let storage = Arc::new(InMemoryDurableStorage::new());
        let durable = DurableExecution::new(storage.clone()).with_auto_cleanup(false);

        durable
            .save_checkpoint(
                &json!({}),
                &json!({}),
                0,
                "fetch",
                ExecutionStatus::Running,
                None,
                None,
            )
            .await
            .unwrap();
        durable.mark_completed().await.unwrap();

        let loaded = durable
            .load_checkpoint::<serde_json::Value>()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_execution_info_flattens_record() {
        let (_, durable) = manager();
        durable
            .save_checkpoint(
                &json!({}),
                &json!({}),
                4,
                "persist",
                ExecutionStatus::Paused,
                None,
                None,
            )
            .await
            .unwrap();

        let info = durable.get_execution_info().await.unwrap().unwrap();
        assert_eq!(info.execution_id, durable.execution_id());
        assert_eq!(info.status, ExecutionStatus::Paused);
        assert_eq!(info.step_index, 4);
        assert_eq!(info.step_name, "persist");
        assert!(info.saved_at.is_some());
    }

    #[tokio::test]
    async fn test_load_by_id_disables_auto_cleanup() {
        let (storage, durable) = manager();
        durable
            .save_checkpoint(
                &json!({}),
                &json!({}),
                0,
                "fetch",
                ExecutionStatus::Running,
                None,
                None,
            )
            .await
            .unwrap();

        let rehydrated =
            DurableExecution::load_by_id(durable.execution_id(), storage.clone())
                .await
                .unwrap()
                .unwrap();
        assert!(!rehydrated.auto_cleanup());
        assert_eq!(rehydrated.execution_id(), durable.execution_id());

        let absent = DurableExecution::load_by_id("no-such-id", storage)
            .await
            .unwrap();
        assert!(absent.is_none());
    }

    #[tokio::test]
    async fn test_blocking_call_from_async_context_fails_fast() {
        let (_, durable) = manager();
        let result = durable.load_checkpoint_blocking::<serde_json::Value>();
        assert!(matches!(
            result,
            Err(DurableError::BlockingInAsyncContext)
        ));
    }

    #[test]
    fn test_blocking_variants_outside_runtime() {
        let storage: Arc<InMemoryDurableStorage> = Arc::new(InMemoryDurableStorage::new());
        let durable = DurableExecution::new(storage.clone()).with_auto_cleanup(false);

        durable
            .save_checkpoint_blocking(
                &json!({"goal": "sync"}),
                &json!({}),
                1,
                "process",
                ExecutionStatus::Running,
                None,
                None,
            )
            .unwrap();

        let loaded = durable
            .load_checkpoint_blocking::<serde_json::Value>()
            .unwrap()
            .unwrap();
        assert_eq!(loaded.step_index, 1);

        durable.mark_failed_blocking("timeout").unwrap();
        let info = durable.get_execution_info_blocking().unwrap().unwrap();
        assert_eq!(info.status, ExecutionStatus::Failed);
        assert_eq!(info.error.as_deref(), Some("timeout"));
    }
}
