//! Executor model: capability advertisements, live utilization, and
//! candidacy rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ExecutorId;
use crate::location::{DataLocation, GeoLocation, Zone};

/// An executor is a placement candidate only if it reported within this
/// window and is administratively approved.
pub const LIVENESS_WINDOW_SECS: i64 = 60;

/// Executor type tag advertised at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorType {
    Edge,
    Cloud,
    Hpc,
    Fog,
    Local,
    PrivateCloud,
    PublicCloud,
}

impl ExecutorType {
    /// Coarse zone this executor type occupies.
    pub fn zone(self) -> Zone {
        match self {
            ExecutorType::Local => Zone::Local,
            ExecutorType::Edge => Zone::Edge,
            ExecutorType::Fog => Zone::Fog,
            ExecutorType::Cloud | ExecutorType::PrivateCloud | ExecutorType::PublicCloud => {
                Zone::Cloud
            }
            ExecutorType::Hpc => Zone::Hpc,
        }
    }
}

impl std::fmt::Display for ExecutorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutorType::Edge => "edge",
            ExecutorType::Cloud => "cloud",
            ExecutorType::Hpc => "hpc",
            ExecutorType::Fog => "fog",
            ExecutorType::Local => "local",
            ExecutorType::PrivateCloud => "private_cloud",
            ExecutorType::PublicCloud => "public_cloud",
        };
        write!(f, "{}", s)
    }
}

/// Administrative state set by the coordination plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorState {
    Pending,
    Approved,
    Rejected,
}

/// One GPU device class on an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuSpec {
    pub name: String,
    pub count: u32,
    pub memory_bytes: u64,
}

/// Advertised hardware capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareSpec {
    pub cpu_millicores: u64,
    pub memory_bytes: u64,
    pub storage_bytes: u64,
    #[serde(default)]
    pub gpus: Vec<GpuSpec>,
}

impl HardwareSpec {
    pub fn has_gpu(&self) -> bool {
        self.gpus.iter().any(|g| g.count > 0)
    }
}

/// Advertised software environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftwareSpec {
    pub image: String,
    pub kind: String,
    pub version: String,
}

/// Full capability advertisement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub hardware: HardwareSpec,
    pub software: SoftwareSpec,
}

/// Live utilization fractions, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Utilization {
    pub compute: f64,
    pub memory: f64,
    pub disk: f64,
    pub network: f64,
}

impl Utilization {
    pub fn zero() -> Self {
        Self {
            compute: 0.0,
            memory: 0.0,
            disk: 0.0,
            network: 0.0,
        }
    }

    /// All fractions within [0, 1].
    pub fn is_valid(&self) -> bool {
        [self.compute, self.memory, self.disk, self.network]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }

    /// The binding resource fraction (max of compute and memory).
    pub fn dominant_load(&self) -> f64 {
        self.compute.max(self.memory)
    }
}

/// Cost coefficients advertised by the executor's operator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostCoefficients {
    /// Compute price, $/hour.
    pub compute_per_hour: f64,
    /// Energy price, $/Wh.
    pub energy_per_wh: f64,
    /// Egress price, $/GB.
    pub network_per_gb: f64,
}

/// A worker node in the colony.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Executor {
    pub id: ExecutorId,
    pub executor_type: ExecutorType,
    pub location: GeoLocation,
    /// Region tag for data-locality scoring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub capabilities: Capabilities,
    pub state: ExecutorState,
    pub last_seen: DateTime<Utc>,
    pub utilization: Utilization,
    /// Historical completion reliability in [0, 1].
    pub reliability: f64,
    pub cost: CostCoefficients,
    pub security_level: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    /// Round-trip latency to this executor, milliseconds.
    pub network_latency_ms: f64,
}

impl Executor {
    /// Coarse zone this executor occupies.
    pub fn zone(&self) -> Zone {
        self.executor_type.zone()
    }

    /// This executor's position expressed as a data location.
    pub fn data_location(&self) -> DataLocation {
        DataLocation {
            zone: self.zone(),
            region: self.region.clone(),
        }
    }

    /// Whether this executor may receive work at `now`: approved and seen
    /// within the liveness window.
    pub fn is_candidate(&self, now: DateTime<Utc>) -> bool {
        if self.state != ExecutorState::Approved {
            return false;
        }
        let age = now.signed_duration_since(self.last_seen);
        age.num_seconds() < LIVENESS_WINDOW_SECS && age.num_seconds() >= 0
    }
}
