//! Error types for the Colony placement orchestrator.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Suggested actions for the supervising agent
//!
//! Decisions never surface raw faults to the colony: hard policy, safety,
//! and empty-candidate failures all resolve into local-forced decisions at
//! the orchestrator layer. The variants here exist for internal signalling
//! and for the audit trail.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Deployment profile validation errors.
    Config,
    /// Process or snapshot invariant violations.
    Input,
    /// Hard policy and safety-gate refusals.
    Policy,
    /// Colony wire transport errors.
    Remote,
    /// Adaptive-state numerical and attribution errors.
    Learning,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Input => write!(f, "input"),
            ErrorCategory::Policy => write!(f, "policy"),
            ErrorCategory::Remote => write!(f, "remote"),
            ErrorCategory::Learning => write!(f, "learning"),
        }
    }
}

/// Suggested actions for agents to take in response to errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Retry on the next tick (possibly with backoff).
    Retry,
    /// Fix the deployment profile and restart.
    FixConfig,
    /// Skip this item and continue.
    Skip,
    /// Force local execution for this process.
    RunLocal,
    /// Abort the operation.
    Abort,
    /// No action needed (informational).
    None,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::FixConfig => write!(f, "fix_config"),
            SuggestedAction::Skip => write!(f, "skip"),
            SuggestedAction::RunLocal => write!(f, "run_local"),
            SuggestedAction::Abort => write!(f, "abort"),
            SuggestedAction::None => write!(f, "none"),
        }
    }
}

/// Unified error type for the placement engine.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("invalid deployment profile: {0}")]
    InvalidConfig(String),

    // Input errors (20-29)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("metrics snapshot rejected: {0}")]
    InvalidSnapshot(String),

    #[error("metrics snapshot is stale: {age_secs}s old")]
    StaleSnapshot { age_secs: i64 },

    // Policy and safety errors (30-39)
    #[error("placement blocked by policy rule {rule}: {reason}")]
    PolicyBlocked { rule: String, reason: String },

    #[error("placement blocked by safety gate: {0}")]
    SafetyBlocked(String),

    #[error("no viable candidates after filtering")]
    NoCandidates,

    // Remote errors (40-49)
    #[error("transient colony error: {0}")]
    TransientRemote(String),

    #[error("decision {decision_id} exceeded its {seconds}s budget")]
    Timeout { decision_id: String, seconds: u64 },

    // Learning errors (50-59)
    #[error("weight vector drifted off the simplex: sum={sum}")]
    NumericDrift { sum: f64 },

    #[error("outcome rejected: {0}")]
    CorruptOutcome(String),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Input errors
    /// - 30-39: Policy and safety errors
    /// - 40-49: Remote errors
    /// - 50-59: Learning errors
    pub fn code(&self) -> u32 {
        match self {
            Error::InvalidConfig(_) => 10,
            Error::InvalidInput(_) => 20,
            Error::InvalidSnapshot(_) => 21,
            Error::StaleSnapshot { .. } => 22,
            Error::PolicyBlocked { .. } => 30,
            Error::SafetyBlocked(_) => 31,
            Error::NoCandidates => 32,
            Error::TransientRemote(_) => 40,
            Error::Timeout { .. } => 41,
            Error::NumericDrift { .. } => 50,
            Error::CorruptOutcome(_) => 51,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidConfig(_) => ErrorCategory::Config,

            Error::InvalidInput(_) | Error::InvalidSnapshot(_) | Error::StaleSnapshot { .. } => {
                ErrorCategory::Input
            }

            Error::PolicyBlocked { .. } | Error::SafetyBlocked(_) | Error::NoCandidates => {
                ErrorCategory::Policy
            }

            Error::TransientRemote(_) | Error::Timeout { .. } => ErrorCategory::Remote,

            Error::NumericDrift { .. } | Error::CorruptOutcome(_) => ErrorCategory::Learning,
        }
    }

    /// Returns whether this error is potentially recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Fatal at boot; nothing to retry at runtime.
            Error::InvalidConfig(_) => false,

            // Reject the operation, keep running.
            Error::InvalidInput(_) => true,
            Error::InvalidSnapshot(_) => true,
            Error::StaleSnapshot { .. } => true,

            // Policy refusals resolve into local-forced decisions.
            Error::PolicyBlocked { .. } => true,
            Error::SafetyBlocked(_) => true,
            Error::NoCandidates => true,

            Error::TransientRemote(_) => true,
            Error::Timeout { .. } => true,

            // Re-normalization handles drift; persistent drift reverts.
            Error::NumericDrift { .. } => true,
            Error::CorruptOutcome(_) => true,
        }
    }

    /// Returns the suggested action for agents.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::InvalidConfig(_) => SuggestedAction::FixConfig,

            Error::InvalidInput(_) => SuggestedAction::Skip,
            Error::InvalidSnapshot(_) => SuggestedAction::Retry,
            Error::StaleSnapshot { .. } => SuggestedAction::Retry,

            Error::PolicyBlocked { .. } => SuggestedAction::RunLocal,
            Error::SafetyBlocked(_) => SuggestedAction::RunLocal,
            Error::NoCandidates => SuggestedAction::RunLocal,

            Error::TransientRemote(_) => SuggestedAction::Retry,
            Error::Timeout { .. } => SuggestedAction::Retry,

            Error::NumericDrift { .. } => SuggestedAction::None,
            Error::CorruptOutcome(_) => SuggestedAction::Skip,
        }
    }

    /// Serialize to the agent-facing structured form.
    pub fn to_structured(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code(),
            "category": self.category(),
            "message": self.to_string(),
            "recoverable": self.is_recoverable(),
            "suggested_action": self.suggested_action(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_grouped_by_category() {
        let cases: Vec<(Error, u32, ErrorCategory)> = vec![
            (Error::InvalidConfig("bad".into()), 10, ErrorCategory::Config),
            (Error::InvalidInput("bad".into()), 20, ErrorCategory::Input),
            (
                Error::StaleSnapshot { age_secs: 7200 },
                22,
                ErrorCategory::Input,
            ),
            (
                Error::PolicyBlocked {
                    rule: "security-floor".into(),
                    reason: "level 2 < 4".into(),
                },
                30,
                ErrorCategory::Policy,
            ),
            (Error::NoCandidates, 32, ErrorCategory::Policy),
            (
                Error::TransientRemote("rpc reset".into()),
                40,
                ErrorCategory::Remote,
            ),
            (
                Error::NumericDrift { sum: 1.2 },
                50,
                ErrorCategory::Learning,
            ),
        ];
        for (err, code, category) in cases {
            assert_eq!(err.code(), code, "{err}");
            assert_eq!(err.category(), category, "{err}");
        }
    }

    #[test]
    fn config_errors_are_fatal() {
        let err = Error::InvalidConfig("goal weights sum to 1.4".into());
        assert!(!err.is_recoverable());
        assert_eq!(err.suggested_action(), SuggestedAction::FixConfig);
    }

    #[test]
    fn policy_errors_suggest_local_execution() {
        let err = Error::SafetyBlocked("compute headroom 0.02 below floor".into());
        assert!(err.is_recoverable());
        assert_eq!(err.suggested_action(), SuggestedAction::RunLocal);
    }

    #[test]
    fn structured_form_carries_code_and_category() {
        let err = Error::CorruptOutcome("unknown decision id".into());
        let v = err.to_structured();
        assert_eq!(v["code"], 51);
        assert_eq!(v["category"], "learning");
        assert_eq!(v["recoverable"], true);
    }
}
