//! # durable-exec - Durable Checkpoints for Step-Based Execution
//!
//! **Checkpoint persistence for long-running, step-based tasks**, so that
//! work survives process crashes, restarts, and explicit pauses, and resumes
//! from the last successfully completed step instead of from scratch.
//!
//! ## Overview
//!
//! Each execution is named by an **execution identifier** and has exactly one
//! live checkpoint record: a snapshot of the task, the accumulated step
//! context, the step position, and the execution status. Every save fully
//! replaces the prior record - this is a durability primitive, not an event
//! log.
//!
//! The crate has four components:
//!
//! - [`StateSerializer`] - translates between live task/context objects and
//!   the flat [`ExecutionState`] record. Deserialization returns the task
//!   fully typed but the context as structured data only; rebuilding a live
//!   context needs engine-supplied references and is the caller's follow-up
//!   step.
//! - [`DurableStorage`] - the storage port every backend implements: upsert,
//!   load, delete, list, retention cleanup, stats.
//! - [`RedisDurableStorage`] - the networked backend: JSON primary record,
//!   metadata hash for cheap listing, per-status index sets for cheap
//!   filtering, TTL support, and index-rebuild maintenance.
//!   [`InMemoryDurableStorage`] is the zero-dependency reference backend for
//!   development and tests.
//! - [`DurableExecution`] - the manager the execution engine talks to:
//!   save/load/advance/finalize under one identifier, with both async
//!   methods and `_blocking` companions that refuse to run inside an async
//!   runtime.
//!
//! ## Quick Start
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
//! // Called by the pipeline after each successful step.
//! durable
//!     .save_checkpoint(
//!         &json!({"goal": "process payment"}),
//!         &json!({"outputs": {}}),
//!         0,
//!         "fetch",
//!         ExecutionStatus::Running,
//!         None,
//!         None,
//!     )
//!     .await?;
//!
//! // After a crash, resume from the recorded step.
//! if let Some(checkpoint) = durable.load_checkpoint::<serde_json::Value>().await? {
//!     println!("resuming after step {} ({})", checkpoint.step_index, checkpoint.step_name);
//! }
//!
//! durable.mark_completed().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Consistency model
//!
//! The Redis backend updates the primary record, metadata projection, and
//! status index in one pipelined request - batched, not transactional. A
//! crash between batches can leave the projection or index out of step with
//! the primary record;
//! [`rebuild_indexes`](crate::redis::RedisDurableStorage::rebuild_indexes)
//! repairs that drift and should be run after abnormal termination. Within a
//! process, a [`DurableExecution`] instance serializes its own writes; the
//! design provides no mutual exclusion across processes.

pub mod error;
pub mod execution;
pub mod memory;
pub mod redis;
pub mod serializer;
pub mod state;
pub mod traits;

pub use crate::error::{DurableError, Result};
pub use crate::execution::DurableExecution;
pub use crate::memory::InMemoryDurableStorage;
pub use crate::redis::RedisDurableStorage;
pub use crate::serializer::{LoadedCheckpoint, StateSerializer};
pub use crate::state::{
    generate_execution_id, ExecutionMetadata, ExecutionState, ExecutionStatus,
};
pub use crate::traits::{DurableStorage, StorageStats};
