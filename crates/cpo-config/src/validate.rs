//! Deployment profile validation errors and semantic validation.

use thiserror::Error;

use crate::profile::DeploymentProfile;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Goal weights must sum to 1.0 within this tolerance.
const GOAL_WEIGHT_TOLERANCE: f64 = 0.05;

/// Deployment profile validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::SemanticError(_) => 60,
            ValidationError::MissingField(_) => 61,
            ValidationError::InvalidValue { .. } => 62,
            ValidationError::VersionMismatch { .. } => 63,
        }
    }
}

/// Validate a deployment profile semantically.
///
/// Violations fail startup; nothing here is recoverable at runtime.
pub fn validate_profile(profile: &DeploymentProfile) -> ValidationResult<()> {
    if profile.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: profile.schema_version.clone(),
        });
    }

    if profile.optimization_goals.is_empty() {
        return Err(ValidationError::MissingField("optimization_goals".into()));
    }

    for (i, goal) in profile.optimization_goals.iter().enumerate() {
        if !(0.0..=1.0).contains(&goal.weight) || goal.weight.is_nan() {
            return Err(ValidationError::InvalidValue {
                field: format!("optimization_goals[{}].weight", i),
                message: format!("Must be in [0, 1], got {}", goal.weight),
            });
        }
    }

    let weight_sum: f64 = profile.optimization_goals.iter().map(|g| g.weight).sum();
    if (weight_sum - 1.0).abs() > GOAL_WEIGHT_TOLERANCE {
        return Err(ValidationError::SemanticError(format!(
            "Goal weights must sum to 1.0 ± {}, got {}",
            GOAL_WEIGHT_TOLERANCE, weight_sum,
        )));
    }

    validate_learning(profile)?;
    validate_algorithm(profile)?;
    validate_behavior(profile)?;
    validate_safety(profile)?;

    Ok(())
}

fn validate_learning(profile: &DeploymentProfile) -> ValidationResult<()> {
    let learning = &profile.learning;

    if !(0.0..=1.0).contains(&learning.data_gravity_factor) || learning.data_gravity_factor.is_nan()
    {
        return Err(ValidationError::InvalidValue {
            field: "learning.data_gravity_factor".into(),
            message: format!("Must be in [0, 1], got {}", learning.data_gravity_factor),
        });
    }

    if !(learning.learning_rate > 0.0 && learning.learning_rate <= 1.0) {
        return Err(ValidationError::InvalidValue {
            field: "learning.learning_rate".into(),
            message: format!("Must be in (0, 1], got {}", learning.learning_rate),
        });
    }

    if learning.exploration_factor < 0.0 || learning.exploration_factor.is_nan() {
        return Err(ValidationError::InvalidValue {
            field: "learning.exploration_factor".into(),
            message: format!("Must be non-negative, got {}", learning.exploration_factor),
        });
    }

    if learning.adaptation_interval_s == 0 {
        return Err(ValidationError::InvalidValue {
            field: "learning.adaptation_interval_s".into(),
            message: "Must be positive".into(),
        });
    }

    Ok(())
}

fn validate_algorithm(profile: &DeploymentProfile) -> ValidationResult<()> {
    let algorithm = &profile.algorithm;

    if !(algorithm.ewma_alpha > 0.0 && algorithm.ewma_alpha < 1.0) {
        return Err(ValidationError::InvalidValue {
            field: "algorithm.ewma_alpha".into(),
            message: format!("Must be in (0, 1), got {}", algorithm.ewma_alpha),
        });
    }

    if !(0.0..1.0).contains(&algorithm.q_learning_discount) || algorithm.q_learning_discount.is_nan()
    {
        return Err(ValidationError::InvalidValue {
            field: "algorithm.q_learning_discount".into(),
            message: format!("Must be in [0, 1), got {}", algorithm.q_learning_discount),
        });
    }

    if algorithm.cusum_threshold <= 0.0 || algorithm.cusum_drift < 0.0 {
        return Err(ValidationError::InvalidValue {
            field: "algorithm.cusum".into(),
            message: format!(
                "Drift must be non-negative and threshold positive, got drift={} threshold={}",
                algorithm.cusum_drift, algorithm.cusum_threshold,
            ),
        });
    }

    Ok(())
}

fn validate_behavior(profile: &DeploymentProfile) -> ValidationResult<()> {
    let behavior = &profile.behavior;

    if behavior.max_concurrent_processes == 0 {
        return Err(ValidationError::InvalidValue {
            field: "behavior.max_concurrent_processes".into(),
            message: "Must be positive".into(),
        });
    }

    if behavior.assign_interval_s <= 0.0 || behavior.metrics_update_interval_s <= 0.0 {
        return Err(ValidationError::InvalidValue {
            field: "behavior.intervals".into(),
            message: format!(
                "Intervals must be positive, got assign={} metrics={}",
                behavior.assign_interval_s, behavior.metrics_update_interval_s,
            ),
        });
    }

    if behavior.decision_timeout_s == 0 {
        return Err(ValidationError::InvalidValue {
            field: "behavior.decision_timeout_s".into(),
            message: "Must be positive".into(),
        });
    }

    if behavior.queue_threshold == 0 {
        return Err(ValidationError::InvalidValue {
            field: "behavior.queue_threshold".into(),
            message: "Must be positive".into(),
        });
    }

    Ok(())
}

fn validate_safety(profile: &DeploymentProfile) -> ValidationResult<()> {
    let safety = &profile.safety;

    for (field, value) in [
        ("safety.min_compute_headroom", safety.min_compute_headroom),
        ("safety.min_memory_headroom", safety.min_memory_headroom),
    ] {
        if !(0.0..=1.0).contains(&value) || value.is_nan() {
            return Err(ValidationError::InvalidValue {
                field: field.into(),
                message: format!("Must be in [0, 1], got {}", value),
            });
        }
    }

    Ok(())
}
