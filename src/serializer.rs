//! State codec between live execution objects and checkpoint records
//!
//! [`StateSerializer`] translates an in-memory execution snapshot (task, step
//! context, status, error, side metadata) into a flat, store-agnostic
//! [`ExecutionState`] record and back.
//!
//! Serialization is total and lossless for every field the manager persists.
//! Deserialization is deliberately asymmetric: the task comes back fully
//! typed, but the context is returned as structured JSON only, because
//! reconstructing a live context requires collaborator-supplied references
//! (current model/agent instances) that the codec does not have. Full context
//! reconstruction is an explicit follow-up step performed by the caller.

use crate::{
    error::Result,
    state::{ExecutionState, ExecutionStatus},
};
use serde::{de::DeserializeOwned, Serialize};

/// A checkpoint loaded back from storage, with the task reconstructed
///
/// `context_data` holds the serialized context as-is; it is the caller's job
/// to rebuild a live context object from it with current engine references.
#[derive(Debug, Clone)]
pub struct LoadedCheckpoint<T> {
    /// Fully reconstructed task
    pub task: T,
    /// Serialized context data, not a live object
    pub context_data: serde_json::Value,
    /// Ordinal of the last step processed
    pub step_index: u64,
    /// Label of the last step processed
    pub step_name: String,
    /// Status at capture time
    pub status: ExecutionStatus,
    /// Failure detail, when failed
    pub error: Option<String>,
    /// Opaque engine state preserved across the round trip
    pub agent_state: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Codec between live task/context objects and [`ExecutionState`] records
#[derive(Debug, Clone, Default)]
pub struct StateSerializer;

impl StateSerializer {
    pub fn new() -> Self {
        Self
    }

    /// Produce a checkpoint record from a live execution snapshot
    #[allow(clippy::too_many_arguments)]
    pub fn serialize_state<T, C>(
        &self,
        task: &T,
        context: &C,
        step_index: u64,
        step_name: &str,
        status: ExecutionStatus,
        error: Option<String>,
        agent_state: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<ExecutionState>
    where
        T: Serialize,
        C: Serialize,
    {
        let mut state = ExecutionState::new(
            serde_json::to_value(task)?,
            serde_json::to_value(context)?,
        )
        .with_step(step_index, step_name)
        .with_status(status);

        state.error = error;
        state.agent_state = agent_state;
        Ok(state)
    }

    /// Decode a stored record, reconstructing the task but leaving the
    /// context as structured data
    pub fn deserialize_state<T>(&self, state: ExecutionState) -> Result<LoadedCheckpoint<T>>
    where
        T: DeserializeOwned,
    {
        Ok(LoadedCheckpoint {
            task: serde_json::from_value(state.task)?,
            context_data: state.context,
            step_index: state.step_index,
            step_name: state.step_name,
            status: state.status,
            error: state.error,
            agent_state: state.agent_state,
        })
    }
}
