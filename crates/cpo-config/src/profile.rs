//! Deployment profile types.
//!
//! A profile describes one deployment of the orchestrator: what to
//! optimize for, the constraints it must respect, and the learning and
//! loop-timing knobs. `DeploymentProfile::preset` seeds sensible defaults
//! per deployment type; callers then override fields as needed and run
//! the result through [`crate::validate::validate_profile`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deployment archetype; seeds preset defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
    Edge,
    Cloud,
    Hpc,
    Hybrid,
    Fog,
}

impl DeploymentType {
    /// All deployment types.
    pub const ALL: &'static [DeploymentType] = &[
        DeploymentType::Edge,
        DeploymentType::Cloud,
        DeploymentType::Hpc,
        DeploymentType::Hybrid,
        DeploymentType::Fog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentType::Edge => "edge",
            DeploymentType::Cloud => "cloud",
            DeploymentType::Hpc => "hpc",
            DeploymentType::Hybrid => "hybrid",
            DeploymentType::Fog => "fog",
        }
    }
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metric an optimization goal targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalMetric {
    Latency,
    ComputeCost,
    DataMovement,
    Throughput,
    Energy,
}

/// One weighted optimization goal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizationGoal {
    pub metric: GoalMetric,
    /// Relative weight in [0, 1]; goal weights sum to 1.0 ± 0.05.
    pub weight: f64,
    /// Whether smaller is better for this metric.
    pub minimize: bool,
}

impl OptimizationGoal {
    pub fn minimize(metric: GoalMetric, weight: f64) -> Self {
        Self {
            metric,
            weight,
            minimize: true,
        }
    }

    pub fn maximize(metric: GoalMetric, weight: f64) -> Self {
        Self {
            metric,
            weight,
            minimize: false,
        }
    }
}

/// Constraint categories recognized by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    SlaDeadline,
    BudgetHourly,
    DataSovereignty,
}

/// One deployment constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub kind: ConstraintKind,
    /// Constraint payload: seconds for deadlines, dollars for budgets,
    /// a jurisdiction tag for sovereignty.
    pub value: serde_json::Value,
    pub is_hard: bool,
}

/// Learning-subsystem knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearningParameters {
    /// How strongly locality dominates scoring, in [0, 1].
    pub data_gravity_factor: f64,
    /// Exploration bonus scale for under-sampled actions.
    pub exploration_factor: f64,
    /// Gradient step size for weight updates, in (0, 1].
    pub learning_rate: f64,
    /// Seconds between adaptation batches.
    pub adaptation_interval_s: u64,
    /// Outcomes required before the first adaptation batch.
    pub min_decisions_before_adaptation: u32,
    /// Whether the strategy bandit participates in decisions.
    pub strategy_enabled: bool,
}

impl Default for LearningParameters {
    fn default() -> Self {
        Self {
            data_gravity_factor: 0.5,
            exploration_factor: 0.1,
            learning_rate: 0.001,
            adaptation_interval_s: 300,
            min_decisions_before_adaptation: 10,
            strategy_enabled: true,
        }
    }
}

/// Algorithm-level tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmParameters {
    /// EWMA decay for queue velocity smoothing, in (0, 1).
    pub ewma_alpha: f64,
    /// CUSUM drift allowance for change detection.
    pub cusum_drift: f64,
    /// CUSUM alarm threshold.
    pub cusum_threshold: f64,
    /// Discount factor for the action-value learner, in [0, 1).
    pub q_learning_discount: f64,
    pub thompson_sampling_enabled: bool,
    pub q_learning_enabled: bool,
}

impl Default for AlgorithmParameters {
    fn default() -> Self {
        Self {
            ewma_alpha: 0.167,
            cusum_drift: 0.05,
            cusum_threshold: 2.0,
            q_learning_discount: 0.9,
            thompson_sampling_enabled: true,
            q_learning_enabled: true,
        }
    }
}

/// Loop timing and concurrency settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BehaviorSettings {
    pub assign_interval_s: f64,
    pub metrics_update_interval_s: f64,
    pub decision_timeout_s: u64,
    pub max_concurrent_processes: usize,
    /// Queue depth at which pressure reads 1.0.
    pub queue_threshold: usize,
}

impl Default for BehaviorSettings {
    fn default() -> Self {
        Self {
            assign_interval_s: 1.0,
            metrics_update_interval_s: 5.0,
            decision_timeout_s: 300,
            max_concurrent_processes: 8,
            queue_threshold: 20,
        }
    }
}

/// Local-headroom floors for the safety gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyFloors {
    /// Minimum local compute headroom (1 - utilization) before offload
    /// decisions are suspended.
    pub min_compute_headroom: f64,
    /// Minimum local memory headroom before offload decisions are
    /// suspended.
    pub min_memory_headroom: f64,
}

impl Default for SafetyFloors {
    fn default() -> Self {
        Self {
            min_compute_headroom: 0.05,
            min_memory_headroom: 0.05,
        }
    }
}

/// A complete deployment profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentProfile {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub deployment_type: DeploymentType,
    pub optimization_goals: Vec<OptimizationGoal>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub learning: LearningParameters,
    #[serde(default)]
    pub algorithm: AlgorithmParameters,
    #[serde(default)]
    pub behavior: BehaviorSettings,
    #[serde(default)]
    pub safety: SafetyFloors,
}

fn default_schema_version() -> String {
    crate::CONFIG_SCHEMA_VERSION.to_string()
}

impl DeploymentProfile {
    /// Preset profile for a deployment type.
    ///
    /// Edge deployments weight latency and data movement; cloud weights
    /// cost; hpc weights throughput; fog and hybrid sit between.
    pub fn preset(deployment_type: DeploymentType) -> Self {
        let (goals, learning) = match deployment_type {
            DeploymentType::Edge => (
                vec![
                    OptimizationGoal::minimize(GoalMetric::Latency, 0.4),
                    OptimizationGoal::minimize(GoalMetric::DataMovement, 0.3),
                    OptimizationGoal::minimize(GoalMetric::Energy, 0.2),
                    OptimizationGoal::minimize(GoalMetric::ComputeCost, 0.1),
                ],
                LearningParameters {
                    data_gravity_factor: 0.8,
                    ..LearningParameters::default()
                },
            ),
            DeploymentType::Cloud => (
                vec![
                    OptimizationGoal::minimize(GoalMetric::ComputeCost, 0.4),
                    OptimizationGoal::maximize(GoalMetric::Throughput, 0.3),
                    OptimizationGoal::minimize(GoalMetric::Latency, 0.2),
                    OptimizationGoal::minimize(GoalMetric::DataMovement, 0.1),
                ],
                LearningParameters {
                    data_gravity_factor: 0.3,
                    ..LearningParameters::default()
                },
            ),
            DeploymentType::Hpc => (
                vec![
                    OptimizationGoal::maximize(GoalMetric::Throughput, 0.5),
                    OptimizationGoal::minimize(GoalMetric::DataMovement, 0.25),
                    OptimizationGoal::minimize(GoalMetric::Energy, 0.15),
                    OptimizationGoal::minimize(GoalMetric::ComputeCost, 0.1),
                ],
                LearningParameters {
                    data_gravity_factor: 0.6,
                    ..LearningParameters::default()
                },
            ),
            DeploymentType::Hybrid => (
                vec![
                    OptimizationGoal::minimize(GoalMetric::Latency, 0.25),
                    OptimizationGoal::minimize(GoalMetric::ComputeCost, 0.25),
                    OptimizationGoal::minimize(GoalMetric::DataMovement, 0.25),
                    OptimizationGoal::maximize(GoalMetric::Throughput, 0.25),
                ],
                LearningParameters {
                    data_gravity_factor: 0.5,
                    ..LearningParameters::default()
                },
            ),
            DeploymentType::Fog => (
                vec![
                    OptimizationGoal::minimize(GoalMetric::Latency, 0.35),
                    OptimizationGoal::minimize(GoalMetric::DataMovement, 0.3),
                    OptimizationGoal::minimize(GoalMetric::Energy, 0.2),
                    OptimizationGoal::minimize(GoalMetric::ComputeCost, 0.15),
                ],
                LearningParameters {
                    data_gravity_factor: 0.7,
                    ..LearningParameters::default()
                },
            ),
        };

        Self {
            schema_version: default_schema_version(),
            deployment_type,
            optimization_goals: goals,
            constraints: Vec::new(),
            learning,
            algorithm: AlgorithmParameters::default(),
            behavior: BehaviorSettings::default(),
            safety: SafetyFloors::default(),
        }
    }
}
