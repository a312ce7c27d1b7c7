//! Thompson-sampled choice among named placement strategies.
//!
//! Each strategy keeps a Beta posterior over "this strategy's outcomes
//! satisfy its own success predicate". Choosing samples one value per
//! posterior and takes the arg-max; recording an outcome applies the
//! conjugate update. Posteriors decay periodically so old evidence fades.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use cpo_math::BetaPosterior;

use super::weights::{ScoreTerm, TERM_COUNT};
use crate::orchestrator::outcome::ProcessOutcome;

/// Number of named strategies.
pub const STRATEGY_COUNT: usize = 4;
/// Posterior decay multiplier applied every decay period.
const DECAY_FACTOR: f64 = 0.95;
/// Posterior parameters never decay below the uniform prior.
const DECAY_FLOOR: f64 = 1.0;
/// Data movement under this many GB counts as local for the data-local
/// success predicate.
const DATA_LOCAL_TRANSFER_CAP_GB: f64 = 1.0;

/// A named placement strategy: a re-weighting profile over the scorer's
/// terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    DataLocal,
    Performance,
    CostOptimal,
    Balanced,
}

impl Strategy {
    pub const ALL: [Strategy; STRATEGY_COUNT] = [
        Strategy::DataLocal,
        Strategy::Performance,
        Strategy::CostOptimal,
        Strategy::Balanced,
    ];

    pub fn index(self) -> usize {
        match self {
            Strategy::DataLocal => 0,
            Strategy::Performance => 1,
            Strategy::CostOptimal => 2,
            Strategy::Balanced => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Strategy::DataLocal => "data_local",
            Strategy::Performance => "performance",
            Strategy::CostOptimal => "cost_optimal",
            Strategy::Balanced => "balanced",
        }
    }

    /// Per-term multipliers applied on top of the adaptive weights.
    pub fn multipliers(self) -> [f64; TERM_COUNT] {
        // Order matches ScoreTerm::ALL: queue, load, network, latency,
        // energy, policy.
        match self {
            Strategy::DataLocal => [1.0, 1.0, 1.8, 1.2, 1.0, 1.0],
            Strategy::Performance => [1.3, 1.5, 0.8, 1.4, 0.7, 1.0],
            Strategy::CostOptimal => [0.8, 1.0, 1.3, 0.7, 1.5, 1.0],
            Strategy::Balanced => [1.0; TERM_COUNT],
        }
    }

    /// Multiplier for one term.
    pub fn multiplier(self, term: ScoreTerm) -> f64 {
        self.multipliers()[term.index()]
    }

    /// Whether an outcome counts as a success for this strategy.
    pub fn succeeded(self, outcome: &ProcessOutcome) -> bool {
        match self {
            Strategy::DataLocal => {
                outcome.success && outcome.data_transfer_gb <= DATA_LOCAL_TRANSFER_CAP_GB
            }
            Strategy::Performance => outcome.success && outcome.met_sla,
            Strategy::CostOptimal => outcome.met_sla && outcome.under_budget,
            Strategy::Balanced => outcome.success,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Thompson sampler over the four strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyBandit {
    posteriors: [BetaPosterior; STRATEGY_COUNT],
    enabled: bool,
    decay_period_secs: u64,
    last_decay: DateTime<Utc>,
}

impl StrategyBandit {
    pub fn new(enabled: bool, decay_period_secs: u64, now: DateTime<Utc>) -> Self {
        Self {
            posteriors: [BetaPosterior::uniform(); STRATEGY_COUNT],
            enabled,
            decay_period_secs,
            last_decay: now,
        }
    }

    /// Sample one value per posterior and pick the arg-max.
    ///
    /// With sampling disabled the bandit always answers `Balanced`.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Strategy {
        if !self.enabled {
            return Strategy::Balanced;
        }
        let mut best = Strategy::Balanced;
        let mut best_draw = f64::NEG_INFINITY;
        for strategy in Strategy::ALL {
            let draw = self.posteriors[strategy.index()].sample(rng);
            if draw > best_draw {
                best_draw = draw;
                best = strategy;
            }
        }
        best
    }

    /// Record an outcome for the strategy that was in force.
    pub fn record(&mut self, strategy: Strategy, outcome: &ProcessOutcome) {
        let success = strategy.succeeded(outcome);
        self.posteriors[strategy.index()].observe(success);
    }

    /// Decay all posteriors once per decay period.
    pub fn maybe_decay(&mut self, now: DateTime<Utc>) -> bool {
        let period = Duration::seconds(self.decay_period_secs as i64);
        if now.signed_duration_since(self.last_decay) < period {
            return false;
        }
        for posterior in &mut self.posteriors {
            posterior.decay(DECAY_FACTOR, DECAY_FLOOR);
        }
        self.last_decay = now;
        true
    }

    pub fn posterior(&self, strategy: Strategy) -> &BetaPosterior {
        &self.posteriors[strategy.index()]
    }

    /// Posterior parameters are proper (alpha, beta >= 1).
    pub fn is_healthy(&self) -> bool {
        self.posteriors
            .iter()
            .all(|p| p.alpha >= DECAY_FLOOR && p.beta >= DECAY_FLOOR)
    }
}
