//! Process model: queued function invocations with conditions, deadlines,
//! data requirements, and placement hints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::executor::ExecutorType;
use crate::id::ProcessId;
use crate::location::DataLocation;

/// Lifecycle state reported by the colony.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Waiting,
    Running,
    Successful,
    Failed,
}

/// Hard requirements a target executor must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    /// Required executor type, if pinned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_type: Option<ExecutorType>,
    pub min_cpu_millicores: u64,
    pub min_memory_bytes: u64,
    pub requires_gpu: bool,
    /// Declared security level; the target's level must be at least this.
    pub security_level: u8,
    /// Acceptable data jurisdictions, empty = unrestricted.
    #[serde(default)]
    pub jurisdictions: Vec<String>,
}

impl Default for Conditions {
    fn default() -> Self {
        Self {
            executor_type: None,
            min_cpu_millicores: 0,
            min_memory_bytes: 0,
            requires_gpu: false,
            security_level: 0,
            jurisdictions: Vec::new(),
        }
    }
}

/// Input/output data shape of an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRequirements {
    pub input_size_gb: f64,
    pub input_location: DataLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_location: Option<DataLocation>,
    pub sensitive: bool,
}

/// Soft hints describing the workload profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceHints {
    pub latency_sensitive: bool,
    pub cpu_intensive: bool,
    pub memory_intensive: bool,
    pub gpu_intensive: bool,
    pub network_intensive: bool,
    pub cost_sensitive: bool,
}

/// A queued function invocation pulled from the colony.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub id: ProcessId,
    pub func_name: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    #[serde(default)]
    pub kwargs: HashMap<String, serde_json::Value>,
    pub conditions: Conditions,
    /// Larger = more urgent.
    pub priority: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_deadline: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exec_deadline: Option<DateTime<Utc>>,
    pub data: DataRequirements,
    pub hints: ResourceHints,
    /// Must never leave the local executor set.
    pub safety_critical: bool,
    /// Must stay in the local/edge set.
    pub locality_required: bool,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub state: ProcessState,
}

impl Process {
    /// Seconds this process has waited since submission.
    pub fn wait_seconds(&self, now: DateTime<Utc>) -> f64 {
        let secs = now.signed_duration_since(self.submitted_at).num_milliseconds() as f64 / 1000.0;
        secs.max(0.0)
    }

    /// Remaining execution budget at `now`, if an exec deadline is set.
    pub fn exec_budget_seconds(&self, now: DateTime<Utc>) -> Option<f64> {
        self.exec_deadline
            .map(|d| d.signed_duration_since(now).num_milliseconds() as f64 / 1000.0)
    }
}
