//! Adaptive state: weights, strategy posteriors, action values, and
//! patterns.
//!
//! All learners live inside one [`AdaptiveState`] owned by the
//! orchestrator and shared behind a single reader-writer guard. Decisions
//! read an atomic snapshot; outcomes are applied serially in arrival
//! order on the writer side, which makes the adaptive state a
//! serializable log of updates.

pub mod patterns;
pub mod strategy;
pub mod value;
pub mod weights;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use cpo_common::{DecisionId, Executor, Process, Result, Zone};
use cpo_config::DeploymentProfile;

use crate::metrics::MetricsVector;
use crate::orchestrator::outcome::ProcessOutcome;
use patterns::{ContextSignature, PatternStore};
use strategy::{Strategy, StrategyBandit};
use value::{PlacementAction, StateBucket, ValueLearner, DEFAULT_TABLE_CAPACITY};
use weights::{AdaptiveWeights, WeightAdapter};

/// Strategy posteriors decay once per hour.
const STRATEGY_DECAY_PERIOD_SECS: u64 = 3600;

/// Everything captured when a decision was made, passed back to the
/// learners verbatim when its outcome arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionContext {
    pub decision_id: DecisionId,
    pub process: Process,
    /// The chosen target; absent for local-forced decisions.
    pub executor: Option<Executor>,
    pub metrics: MetricsVector,
    pub strategy: Strategy,
}

impl DecisionContext {
    /// Where the work actually ran.
    pub fn target_zone(&self) -> Zone {
        self.executor.as_ref().map(|e| e.zone()).unwrap_or(Zone::Local)
    }
}

/// The orchestrator's learning state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveState {
    pub weights: WeightAdapter,
    pub bandit: StrategyBandit,
    pub values: ValueLearner,
    pub patterns: PatternStore,
    outcomes_applied: u64,
    min_outcomes_before_adaptation: u32,
}

impl AdaptiveState {
    pub fn from_profile(profile: &DeploymentProfile, now: DateTime<Utc>) -> Self {
        Self {
            weights: WeightAdapter::new(
                AdaptiveWeights::from_goals(&profile.optimization_goals),
                profile.learning.learning_rate,
            ),
            bandit: StrategyBandit::new(
                profile.algorithm.thompson_sampling_enabled && profile.learning.strategy_enabled,
                STRATEGY_DECAY_PERIOD_SECS,
                now,
            ),
            values: ValueLearner::new(
                profile.algorithm.q_learning_enabled,
                profile.algorithm.q_learning_discount,
                profile.learning.exploration_factor,
                DEFAULT_TABLE_CAPACITY,
            ),
            patterns: PatternStore::new(),
            outcomes_applied: 0,
            min_outcomes_before_adaptation: profile.learning.min_decisions_before_adaptation,
        }
    }

    pub fn outcomes_applied(&self) -> u64 {
        self.outcomes_applied
    }

    /// Thompson-sample a strategy for the next decision.
    pub fn choose_strategy<R: Rng + ?Sized>(&self, rng: &mut R) -> Strategy {
        self.bandit.choose(rng)
    }

    /// Apply one outcome to every learner, in order, under the writer
    /// guard. Returns the scalar reward that was learned from.
    ///
    /// The context is the `(Process, Executor, Metrics)` triple captured
    /// when the decision was made, not a reconstruction.
    pub fn apply_outcome(
        &mut self,
        context: &DecisionContext,
        outcome: &ProcessOutcome,
        now: DateTime<Utc>,
    ) -> Result<f64> {
        outcome.validate()?;
        let reward = outcome.reward();

        self.bandit.record(context.strategy, outcome);

        let state = StateBucket::from_metrics(&context.metrics);
        let action = PlacementAction::for_zone(context.target_zone());
        // The post-completion state is not observed; the recorded state
        // stands in for it.
        self.values.update(state, action, reward, state, now);

        self.patterns.observe(
            ContextSignature::from_metrics(&context.metrics),
            action,
            reward,
            now,
        );

        self.outcomes_applied += 1;
        if self.outcomes_applied > self.min_outcomes_before_adaptation as u64 {
            if let Err(e) = self.weights.apply(&outcome.attribution_or_derived(), reward) {
                // The adapter already reverted to its last good projection.
                tracing::warn!(error = %e, decision_id = %context.decision_id, "weight update reverted");
            }
        }

        Ok(reward)
    }

    /// Periodic maintenance driven by the adaptation loop: posterior
    /// decay, pattern validation scans, value-table eviction.
    pub fn adaptation_tick(&mut self, now: DateTime<Utc>) {
        self.bandit.maybe_decay(now);
        self.patterns.scan(now);
        self.values.evict_to_capacity();
    }

    /// Weight simplex and posterior sanity, for the health check.
    pub fn is_healthy(&self) -> bool {
        self.weights.is_healthy() && self.bandit.is_healthy()
    }
}
