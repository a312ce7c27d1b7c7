//! Outcome reports and reward shaping.
//!
//! A completion callback carries the observable result of one dispatched
//! process. The reward collapses it into a scalar for the learners;
//! attribution splits responsibility across scoring terms, either as
//! reported by the collaborator or derived from the outcome's own
//! components.

use serde::{Deserialize, Serialize};

use cpo_common::{DecisionId, Error, Result};

use crate::adapt::weights::{Attribution, ScoreTerm};
use crate::scoring::gravity::normalized;

/// Reward weight on normalized performance.
const REWARD_PERF_WEIGHT: f64 = 1.0;
/// Reward weight on normalized monetary cost.
const REWARD_COST_WEIGHT: f64 = 0.5;
/// Reward weight on the SLA penalty.
const REWARD_SLA_WEIGHT: f64 = 0.5;
/// Latency at which normalized performance halves, milliseconds.
const LATENCY_SCALE_MS: f64 = 1000.0;
/// Cost at which the normalized cost halves, dollars.
const COST_SCALE_USD: f64 = 1.0;

/// The reported result of one dispatched process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub decision_id: DecisionId,
    pub success: bool,
    pub latency_ms: f64,
    pub cost_usd: f64,
    /// Items per second the target sustained.
    pub throughput: f64,
    pub energy_wh: f64,
    pub data_transfer_gb: f64,
    pub met_sla: bool,
    pub under_budget: bool,
    /// Per-term responsibility as reported; derived when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribution: Option<Attribution>,
}

impl ProcessOutcome {
    /// The synthetic outcome recorded when a decision times out: a soft
    /// failure with nothing observed.
    pub fn timed_out(decision_id: DecisionId, budget_secs: u64) -> Self {
        Self {
            decision_id,
            success: false,
            latency_ms: budget_secs as f64 * 1000.0,
            cost_usd: 0.0,
            throughput: 0.0,
            energy_wh: 0.0,
            data_transfer_gb: 0.0,
            met_sla: false,
            under_budget: false,
            attribution: None,
        }
    }

    /// Reject malformed reports at the boundary.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("latency_ms", self.latency_ms),
            ("cost_usd", self.cost_usd),
            ("throughput", self.throughput),
            ("energy_wh", self.energy_wh),
            ("data_transfer_gb", self.data_transfer_gb),
        ];
        for (name, value) in fields {
            if value.is_nan() || value < 0.0 {
                return Err(Error::CorruptOutcome(format!(
                    "{} is {} in outcome for {}",
                    name, value, self.decision_id
                )));
            }
        }
        Ok(())
    }

    /// Scalar learning reward in roughly [-1, 1].
    ///
    /// `perf - cost - sla`: performance only counts on success and decays
    /// with latency; cost and a missed SLA pull the reward down.
    pub fn reward(&self) -> f64 {
        let norm_perf = if self.success {
            1.0 - normalized(self.latency_ms, LATENCY_SCALE_MS)
        } else {
            0.0
        };
        let norm_cost = normalized(self.cost_usd, COST_SCALE_USD);
        let sla_penalty = if self.met_sla { 0.0 } else { 1.0 };
        REWARD_PERF_WEIGHT * norm_perf
            - REWARD_COST_WEIGHT * norm_cost
            - REWARD_SLA_WEIGHT * sla_penalty
    }

    /// The reported attribution, or one derived from the outcome's
    /// component magnitudes.
    pub fn attribution_or_derived(&self) -> Attribution {
        if let Some(attribution) = self.attribution {
            return attribution;
        }
        let shares = [
            (ScoreTerm::QueueDepth, normalized(self.throughput, 10.0)),
            (ScoreTerm::ProcessorLoad, normalized(self.cost_usd, COST_SCALE_USD)),
            (ScoreTerm::NetworkCost, normalized(self.data_transfer_gb, 10.0)),
            (ScoreTerm::LatencyCost, normalized(self.latency_ms, LATENCY_SCALE_MS)),
            (ScoreTerm::EnergyCost, normalized(self.energy_wh, 100.0)),
            (
                ScoreTerm::PolicyCost,
                if self.met_sla { 0.0 } else { 0.5 },
            ),
        ];
        // A blank outcome (all components zero) attributes uniformly.
        Attribution::new(&shares).unwrap_or_else(|_| {
            Attribution::new(
                &ScoreTerm::ALL
                    .iter()
                    .map(|t| (*t, 1.0))
                    .collect::<Vec<_>>(),
            )
            .expect("uniform attribution is well-formed")
        })
    }
}
