//! The metrics vector: everything one placement decision observes.
//!
//! A [`MetricsVector`] is an immutable snapshot assembled at decision time
//! from colony statistics, the queue analyzer, and the process's data
//! requirements. Snapshots are validated at the boundary; the scorer and
//! learners assume well-formed inputs after that.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use cpo_common::{DataLocation, Error, Result};

/// System-wide utilization fractions, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemUtilization {
    pub compute: f64,
    pub memory: f64,
    pub disk: f64,
    pub network: f64,
    pub controller: f64,
}

impl SystemUtilization {
    pub fn zero() -> Self {
        Self {
            compute: 0.0,
            memory: 0.0,
            disk: 0.0,
            network: 0.0,
            controller: 0.0,
        }
    }

    fn fields(&self) -> [(&'static str, f64); 5] {
        [
            ("compute", self.compute),
            ("memory", self.memory),
            ("disk", self.disk),
            ("network", self.network),
            ("controller", self.controller),
        ]
    }
}

/// One downstream stage of a DAG-shaped workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagStage {
    pub preferred_location: DataLocation,
    pub input_size_gb: f64,
    pub compute_millicores: u64,
}

/// DAG context attached when the process is one stage of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagContext {
    pub current_stage: u32,
    pub total_stages: u32,
    #[serde(default)]
    pub downstream: Vec<DagStage>,
    /// Multiplier (>= 1) applied to downstream transfer estimates.
    pub safety_factor: f64,
}

/// Snapshot of system, data-locality, and DAG context at decision time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsVector {
    pub queue_depth: usize,
    pub queue_threshold: usize,
    pub queue_wait_secs: f64,
    /// Completed items per second.
    pub throughput_per_sec: f64,
    pub system: SystemUtilization,
    pub active_connections: u32,
    pub timestamp: DateTime<Utc>,
    pub hour_of_day: u8,
    pub day_of_week: u8,
    /// Where the process's input data lives.
    pub data_location: DataLocation,
    pub pending_data_gb: f64,
    /// Estimated transfer cost rate to the likely target, $/GB.
    pub transfer_cost_per_gb: f64,
    /// Estimated transfer time to the likely target, seconds.
    pub transfer_time_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dag: Option<DagContext>,
}

impl MetricsVector {
    /// Build a snapshot at `timestamp` with time-of-day fields derived.
    pub fn at(
        timestamp: DateTime<Utc>,
        queue_depth: usize,
        queue_threshold: usize,
        data_location: DataLocation,
        pending_data_gb: f64,
    ) -> Self {
        Self {
            queue_depth,
            queue_threshold,
            queue_wait_secs: 0.0,
            throughput_per_sec: 0.0,
            system: SystemUtilization::zero(),
            active_connections: 0,
            timestamp,
            hour_of_day: timestamp.hour() as u8,
            day_of_week: timestamp.weekday().num_days_from_monday() as u8,
            data_location,
            pending_data_gb,
            transfer_cost_per_gb: 0.0,
            transfer_time_secs: 0.0,
            dag: None,
        }
    }

    /// Queue pressure: depth over threshold.
    pub fn pressure(&self) -> f64 {
        if self.queue_threshold == 0 {
            return 0.0;
        }
        self.queue_depth as f64 / self.queue_threshold as f64
    }

    /// Validate boundary invariants; a rejected snapshot never reaches
    /// the scorer or learners.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in self.system.fields() {
            if !(0.0..=1.0).contains(&value) || value.is_nan() {
                return Err(Error::InvalidSnapshot(format!(
                    "{} utilization {} outside [0, 1]",
                    name, value
                )));
            }
        }
        if self.pending_data_gb < 0.0 || self.pending_data_gb.is_nan() {
            return Err(Error::InvalidSnapshot(format!(
                "pending data size {} is negative",
                self.pending_data_gb
            )));
        }
        if let Some(dag) = &self.dag {
            if dag.safety_factor < 1.0 || dag.safety_factor.is_nan() {
                return Err(Error::InvalidSnapshot(format!(
                    "dag safety factor {} below 1.0",
                    dag.safety_factor
                )));
            }
            if dag.total_stages == 0 || dag.current_stage >= dag.total_stages {
                return Err(Error::InvalidSnapshot(format!(
                    "dag stage {}/{} out of range",
                    dag.current_stage, dag.total_stages
                )));
            }
        }
        Ok(())
    }
}
