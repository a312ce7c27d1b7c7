//! Colony-native entity shapes.
//!
//! These mirror what the coordination plane serves: integer state codes,
//! string type tags, flat cost fields. Conversions into the typed
//! internal model live in [`super::convert`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Statistics snapshots older than this are rejected as stale.
pub const SNAPSHOT_MAX_AGE_SECS: i64 = 3600;

/// Executor state codes on the wire.
pub mod executor_state {
    pub const PENDING: i32 = 0;
    pub const APPROVED: i32 = 1;
    pub const REJECTED: i32 = 2;
}

/// Process state codes on the wire.
pub mod process_state {
    pub const WAITING: i32 = 0;
    pub const RUNNING: i32 = 1;
    pub const SUCCESSFUL: i32 = 2;
    pub const FAILED: i32 = 3;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColonyLocation {
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColonyGpu {
    pub name: String,
    pub count: u32,
    pub memory_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColonyHardware {
    pub cpu_millicores: u64,
    pub memory_bytes: u64,
    pub storage_bytes: u64,
    #[serde(default)]
    pub gpus: Vec<ColonyGpu>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColonySoftware {
    pub image: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColonyCapabilities {
    pub hardware: ColonyHardware,
    pub software: ColonySoftware,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColonyUtilization {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub network: f64,
}

/// An executor as the colony advertises it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColonyExecutor {
    pub executor_id: String,
    /// Type tag: edge, cloud, hpc, fog, local, private_cloud, public_cloud.
    pub executor_type: String,
    pub location: ColonyLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub capabilities: ColonyCapabilities,
    /// 0 pending, 1 approved, 2 rejected.
    pub state: i32,
    pub last_seen: DateTime<Utc>,
    pub utilization: ColonyUtilization,
    pub reliability: f64,
    pub compute_cost_per_hour: f64,
    pub energy_cost_per_wh: f64,
    pub network_cost_per_gb: f64,
    pub security_level: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    pub network_latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColonyConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_type: Option<String>,
    #[serde(default)]
    pub min_cpu_millicores: u64,
    #[serde(default)]
    pub min_memory_bytes: u64,
    #[serde(default)]
    pub gpu_required: bool,
    #[serde(default)]
    pub security_level: u8,
    #[serde(default)]
    pub jurisdictions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColonyDataSpec {
    pub input_size_gb: f64,
    /// Coarse zone tag of the input data.
    pub input_location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_region: Option<String>,
    #[serde(default)]
    pub sensitive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColonyHints {
    #[serde(default)]
    pub latency_sensitive: bool,
    #[serde(default)]
    pub cpu_intensive: bool,
    #[serde(default)]
    pub memory_intensive: bool,
    #[serde(default)]
    pub gpu_intensive: bool,
    #[serde(default)]
    pub network_intensive: bool,
    #[serde(default)]
    pub cost_sensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColonyProcessSpec {
    pub func_name: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    #[serde(default)]
    pub kwargs: HashMap<String, serde_json::Value>,
    pub conditions: ColonyConditions,
    #[serde(default)]
    pub priority: i32,
    /// Seconds the process may wait before assignment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wait_time_s: Option<i64>,
    /// Seconds the process may execute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_exec_time_s: Option<i64>,
    pub data: ColonyDataSpec,
    #[serde(default)]
    pub hints: ColonyHints,
    #[serde(default)]
    pub safety_critical: bool,
    #[serde(default)]
    pub locality_required: bool,
}

/// A queued invocation as the colony serves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColonyProcess {
    pub process_id: String,
    pub spec: ColonyProcessSpec,
    /// 0 waiting, 1 running, 2 successful, 3 failed.
    pub state: i32,
    pub submission_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

/// Capacity accounting for one resource class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCapacity {
    pub total: u64,
    pub allocated: u64,
    pub available: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorSummary {
    pub executor_id: String,
    pub executor_type: String,
    pub state: i32,
    pub location: ColonyLocation,
    pub capabilities: ColonyCapabilities,
    pub current_load: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub process_id: String,
    pub func_name: String,
    pub state: i32,
    pub execution_ms: f64,
}

/// One hour of the 24h performance trend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub hour: u8,
    pub completed: u64,
    pub avg_latency_ms: f64,
}

/// The colony statistics document the engine consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColonyStatistics {
    pub generated_at: DateTime<Utc>,
    pub waiting_processes: u64,
    pub running_processes: u64,
    pub successful_processes: u64,
    pub failed_processes: u64,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub active_connections: u32,
    pub avg_queue_time_ms: f64,
    pub avg_execution_ms: f64,
    #[serde(default)]
    pub capacity: HashMap<String, ResourceCapacity>,
    #[serde(default)]
    pub executors: Vec<ExecutorSummary>,
    #[serde(default)]
    pub recent_processes: Vec<ProcessSummary>,
    #[serde(default)]
    pub trends_24h: Vec<TrendPoint>,
}

impl ColonyStatistics {
    /// Snapshots older than one hour are rejected.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.generated_at).num_seconds() > SNAPSHOT_MAX_AGE_SECS
    }

    /// Age of the snapshot in whole seconds.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.generated_at).num_seconds()
    }
}
