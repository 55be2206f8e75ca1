//! Core data types for durable execution state
//!
//! This module defines the fundamental types of the checkpoint system:
//! **[`ExecutionState`]** - the single live checkpoint record kept per execution
//! identifier, **[`ExecutionStatus`]** - the execution status state machine, and
//! **[`ExecutionMetadata`]** - the lightweight projection used for listing and
//! filtering without deserializing full records.
//!
//! # Overview
//!
//! - **One live record per id** - Every save fully replaces the prior record
//!   for that execution identifier. There is no history.
//! - **Status state machine** - `running → {running, paused, completed, failed}`,
//!   `paused → running`; `completed` and `failed` are terminal.
//! - **Metadata projection** - A flat, always-present subset of the record
//!   (`status`, `step_index`, `step_name`, `timestamp`, `saved_at`, `error`)
//!   that backends keep consistent with the full record on every write.
//! - **Serializable** - All types are serde-derived; the record travels as a
//!   JSON document, the projection as a string/string hash.
//!
//! # Example
//!
//! ```rust
//! use durable_exec::{ExecutionState, ExecutionStatus};
//! use serde_json::json;
//!
//! let state = ExecutionState::new(json!({"goal": "fetch data"}), json!({}))
//!     .with_step(0, "fetch")
//!     .with_status(ExecutionStatus::Running);
//!
//! assert_eq!(state.status, ExecutionStatus::Running);
//! assert!(state.error.is_none());
//! ```

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Execution status state machine
///
/// `Completed` and `Failed` are terminal: no further progress is expected,
/// though a post-terminal save is not forbidden by the storage layer - it
/// simply replaces the current record. Callers that rely on terminality must
/// stop issuing saves after reaching a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Execution is actively progressing through steps
    Running,
    /// Execution is suspended and may resume
    Paused,
    /// Execution finished successfully (terminal)
    Completed,
    /// Execution finished with an error (terminal)
    Failed,
}

impl ExecutionStatus {
    /// All statuses, in index order
    pub const ALL: [ExecutionStatus; 4] = [
        ExecutionStatus::Running,
        ExecutionStatus::Paused,
        ExecutionStatus::Completed,
        ExecutionStatus::Failed,
    ];

    /// Statuses eligible for retention cleanup
    pub const TERMINAL: [ExecutionStatus; 2] =
        [ExecutionStatus::Completed, ExecutionStatus::Failed];

    /// Store-native string form (`running`, `paused`, `completed`, `failed`)
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Paused => "paused",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    /// Whether no further progress is expected
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "paused" => Ok(ExecutionStatus::Paused),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            _ => Err(()),
        }
    }
}

impl Default for ExecutionStatus {
    fn default() -> Self {
        ExecutionStatus::Running
    }
}

/// The unit of durability: a complete snapshot of execution progress
///
/// Exactly one live `ExecutionState` exists per execution identifier; each
/// save replaces the previous record (last write wins). `timestamp` is the
/// logical time of state capture; `saved_at` is stamped by the storage
/// backend at durable-write time and may differ under retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Codec-produced structured form of the task being executed
    pub task: serde_json::Value,

    /// Codec-produced structured form of step context (accumulated inputs/outputs)
    pub context: serde_json::Value,

    /// Ordinal of the last step processed
    pub step_index: u64,

    /// Human-readable label of that step
    pub step_name: String,

    /// Current execution status
    pub status: ExecutionStatus,

    /// Failure detail, present only when `status == Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Opaque extra state the engine wants preserved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_state: Option<serde_json::Map<String, serde_json::Value>>,

    /// Logical time of state capture
    pub timestamp: DateTime<Utc>,

    /// Time of the durable write, stamped by the storage backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,

    /// Owning execution identifier, stamped by the storage backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
}

impl ExecutionState {
    /// Create a new record capturing the current time
    pub fn new(task: serde_json::Value, context: serde_json::Value) -> Self {
        Self {
            task,
            context,
            step_index: 0,
            step_name: String::new(),
            status: ExecutionStatus::Running,
            error: None,
            agent_state: None,
            timestamp: Utc::now(),
            saved_at: None,
            execution_id: None,
        }
    }

    /// Set the step position
    pub fn with_step(mut self, step_index: u64, step_name: impl Into<String>) -> Self {
        self.step_index = step_index;
        self.step_name = step_name.into();
        self
    }

    /// Set the status
    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the failure detail
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Set opaque engine state
    pub fn with_agent_state(
        mut self,
        agent_state: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        self.agent_state = Some(agent_state);
        self
    }

    /// Build the metadata projection for this record
    ///
    /// `execution_id` falls back to the supplied identifier when the record
    /// has not yet been stamped by a storage backend.
    pub fn metadata(&self, execution_id: &str) -> ExecutionMetadata {
        ExecutionMetadata {
            execution_id: self
                .execution_id
                .clone()
                .unwrap_or_else(|| execution_id.to_string()),
            status: self.status,
            step_index: self.step_index,
            step_name: self.step_name.clone(),
            timestamp: Some(self.timestamp),
            saved_at: self.saved_at,
            error: self.error.clone(),
        }
    }
}

/// Lightweight subset of a checkpoint record, used for listing and filtering
///
/// Backends keep the projection consistent with the full record on every
/// write and remove it on every delete. On the wire it is a flat hash of
/// store-native strings; absent values are encoded as empty strings, never a
/// type the store rejects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    /// Owning execution identifier
    pub execution_id: String,
    /// Current status
    pub status: ExecutionStatus,
    /// Ordinal of the last step processed
    pub step_index: u64,
    /// Label of the last step processed
    pub step_name: String,
    /// Logical capture time of the underlying record
    pub timestamp: Option<DateTime<Utc>>,
    /// Durable-write time of the underlying record
    pub saved_at: Option<DateTime<Utc>>,
    /// Failure detail, when failed
    pub error: Option<String>,
}

impl ExecutionMetadata {
    /// Encode as a flat string/string hash for hash-typed stores
    pub fn to_hash(&self) -> Vec<(&'static str, String)> {
        vec![
            ("execution_id", self.execution_id.clone()),
            ("status", self.status.as_str().to_string()),
            ("step_index", self.step_index.to_string()),
            ("step_name", self.step_name.clone()),
            (
                "timestamp",
                self.timestamp.map(|t| t.to_rfc3339()).unwrap_or_default(),
            ),
            (
                "saved_at",
                self.saved_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            ),
            ("error", self.error.clone().unwrap_or_default()),
        ]
    }

    /// Decode from a flat string/string hash
    ///
    /// Returns `None` for an empty hash (missing metadata key) and for a hash
    /// whose `status` field is absent or unparsable: without a status the
    /// record cannot be placed in any index or listing bucket, so the hash is
    /// treated as corrupt rather than guessed at. Other missing fields fall
    /// back to defaults so a partially written hash still lists.
    pub fn from_hash(execution_id: &str, hash: &HashMap<String, String>) -> Option<Self> {
        if hash.is_empty() {
            return None;
        }
        let non_empty = |key: &str| hash.get(key).filter(|v| !v.is_empty()).cloned();
        let status = hash.get("status")?.parse().ok()?;

        Some(Self {
            execution_id: non_empty("execution_id").unwrap_or_else(|| execution_id.to_string()),
            status,
            step_index: hash
                .get("step_index")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            step_name: hash.get("step_name").cloned().unwrap_or_default(),
            timestamp: non_empty("timestamp").and_then(|s| parse_utc_timestamp(&s)),
            saved_at: non_empty("saved_at").and_then(|s| parse_utc_timestamp(&s)),
            error: non_empty("error"),
        })
    }
}

/// Parse a stored timestamp, tolerating a `Z`-suffixed RFC 3339 form and
/// assuming UTC when the offset is missing entirely.
pub fn parse_utc_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Generate an execution identifier: `<14-digit UTC timestamp>-<8-char random suffix>`
pub fn generate_execution_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let suffix: String = Uuid::new_v4().to_string().chars().take(8).collect();
    format!("{timestamp}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_round_trip() {
        for status in ExecutionStatus::ALL {
            assert_eq!(status.as_str().parse::<ExecutionStatus>(), Ok(status));
        }
        assert!("bogus".parse::<ExecutionStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(!ExecutionStatus::Paused.is_terminal());
    }

    #[test]
    fn test_state_builder() {
        let state = ExecutionState::new(json!({"name": "task"}), json!({"inputs": []}))
            .with_step(3, "process")
            .with_status(ExecutionStatus::Failed)
            .with_error("timeout");

        assert_eq!(state.step_index, 3);
        assert_eq!(state.step_name, "process");
        assert_eq!(state.status, ExecutionStatus::Failed);
        assert_eq!(state.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_state_json_skips_absent_fields() {
        let state = ExecutionState::new(json!({}), json!({}));
        let value = serde_json::to_value(&state).unwrap();

        assert!(value.get("error").is_none());
        assert!(value.get("agent_state").is_none());
        assert!(value.get("saved_at").is_none());
        assert_eq!(value["status"], json!("running"));
    }

    #[test]
    fn test_metadata_hash_round_trip() {
        let meta = ExecutionMetadata {
            execution_id: "20240101000000-abcd1234".to_string(),
            status: ExecutionStatus::Failed,
            step_index: 7,
            step_name: "persist".to_string(),
            timestamp: Some(Utc::now()),
            saved_at: Some(Utc::now()),
            error: Some("timeout".to_string()),
        };

        let hash: HashMap<String, String> = meta
            .to_hash()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let decoded = ExecutionMetadata::from_hash(&meta.execution_id, &hash).unwrap();

        assert_eq!(decoded, meta);
    }

    #[test]
    fn test_metadata_hash_absent_fields_are_empty_strings() {
        let meta = ExecutionMetadata {
            execution_id: "id-1".to_string(),
            status: ExecutionStatus::Running,
            step_index: 0,
            step_name: "fetch".to_string(),
            timestamp: None,
            saved_at: None,
            error: None,
        };

        let hash = meta.to_hash();
        let error = hash.iter().find(|(k, _)| *k == "error").unwrap();
        assert_eq!(error.1, "");

        let map: HashMap<String, String> =
            hash.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        let decoded = ExecutionMetadata::from_hash("id-1", &map).unwrap();
        assert!(decoded.error.is_none());
        assert!(decoded.timestamp.is_none());
    }

    #[test]
    fn test_from_hash_empty_is_none() {
        assert!(ExecutionMetadata::from_hash("id-1", &HashMap::new()).is_none());
    }

    #[test]
    fn test_from_hash_requires_valid_status() {
        let mut hash = HashMap::new();
        hash.insert("execution_id".to_string(), "id-1".to_string());
        hash.insert("step_index".to_string(), "2".to_string());
        assert!(ExecutionMetadata::from_hash("id-1", &hash).is_none());

        hash.insert("status".to_string(), "garbled".to_string());
        assert!(ExecutionMetadata::from_hash("id-1", &hash).is_none());

        hash.insert("status".to_string(), "paused".to_string());
        let decoded = ExecutionMetadata::from_hash("id-1", &hash).unwrap();
        assert_eq!(decoded.status, ExecutionStatus::Paused);
    }

    #[test]
    fn test_parse_utc_timestamp_variants() {
        let z = parse_utc_timestamp("2024-06-01T12:00:00Z").unwrap();
        let offset = parse_utc_timestamp("2024-06-01T14:00:00+02:00").unwrap();
        assert_eq!(z, offset);

        // Naive timestamps are assumed UTC.
        let naive = parse_utc_timestamp("2024-06-01T12:00:00").unwrap();
        assert_eq!(naive, z);

        assert!(parse_utc_timestamp("not a timestamp").is_none());
    }

    proptest::proptest! {
        #[test]
        fn prop_metadata_hash_round_trip(
            step_index in proptest::prelude::any::<u64>(),
            step_name in "[a-zA-Z0-9_ -]{0,24}",
            error in proptest::option::of("[ -~]{1,40}"),
            status_idx in 0usize..4,
        ) {
            let meta = ExecutionMetadata {
                execution_id: "prop-exec".to_string(),
                status: ExecutionStatus::ALL[status_idx],
                step_index,
                step_name,
                timestamp: None,
                saved_at: None,
                error,
            };

            let hash: HashMap<String, String> = meta
                .to_hash()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
            let decoded = ExecutionMetadata::from_hash("prop-exec", &hash).unwrap();
            proptest::prop_assert_eq!(decoded, meta);
        }
    }

    #[test]
    fn test_generate_execution_id_format() {
        let id = generate_execution_id();
        let (ts, suffix) = id.split_once('-').unwrap();
        assert_eq!(ts.len(), 14);
        assert!(ts.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(suffix.len(), 8);
        assert_ne!(generate_execution_id(), id);
    }
}
