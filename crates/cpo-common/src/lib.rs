//! Colony placement orchestrator common types, IDs, and errors.
//!
//! This crate provides foundational types shared across cpo-core modules:
//! - Identity types for processes, executors, and decisions
//! - Domain entities (processes, executors, locations, capabilities)
//! - Common error types with stable codes

pub mod error;
pub mod executor;
pub mod id;
pub mod location;
pub mod process;

pub use error::{Error, ErrorCategory, Result, SuggestedAction};
pub use executor::{
    Capabilities, CostCoefficients, Executor, ExecutorState, ExecutorType, GpuSpec, HardwareSpec,
    SoftwareSpec, Utilization, LIVENESS_WINDOW_SECS,
};
pub use id::{DecisionId, ExecutorId, ProcessId, RunId};
pub use location::{locality_score, DataLocation, GeoLocation, Zone};
pub use process::{
    Conditions, DataRequirements, Process, ProcessState, ResourceHints,
};
