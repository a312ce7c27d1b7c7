//! Deployment profile loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for the deployment profile
//! - Per-deployment-type presets
//! - Semantic validation with stable error codes
//!
//! The profile is an injected object: file loading, environment layering,
//! and CLI overrides belong to the hosting binary.

pub mod profile;
pub mod validate;

pub use profile::{
    AlgorithmParameters, BehaviorSettings, Constraint, ConstraintKind, DeploymentProfile,
    DeploymentType, GoalMetric, LearningParameters, OptimizationGoal, SafetyFloors,
};
pub use validate::{validate_profile, ValidationError, ValidationResult};

/// Schema version for deployment profiles.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
