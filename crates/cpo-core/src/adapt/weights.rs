//! Adaptive scoring weights and their gradient updates.
//!
//! Six non-negative weights, one per scoring term, that sum to 1.0. Each
//! outcome attributes fractional responsibility to the terms; the adapter
//! nudges weights along `attribution * (reward - baseline)` and projects
//! the vector back onto the simplex after every batch. Convergence is
//! declared when the projected vector stops moving.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use cpo_common::{Error, Result};
use cpo_config::{GoalMetric, OptimizationGoal};
use cpo_math::{is_on_simplex, l2_distance, project_to_simplex, Ewma, SIMPLEX_TOLERANCE};

/// Number of scoring terms.
pub const TERM_COUNT: usize = 6;
/// Updates per projection batch.
const BATCH_SIZE: usize = 4;
/// Projected-delta window for convergence detection.
const CONVERGENCE_WINDOW: usize = 5;
/// L2 movement per batch below which the weights count as settled.
const CONVERGENCE_THRESHOLD: f64 = 1e-3;
/// EWMA decay for the reward baseline.
const BASELINE_ALPHA: f64 = 0.1;

/// The six scoring terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTerm {
    QueueDepth,
    ProcessorLoad,
    NetworkCost,
    LatencyCost,
    EnergyCost,
    PolicyCost,
}

impl ScoreTerm {
    pub const ALL: [ScoreTerm; TERM_COUNT] = [
        ScoreTerm::QueueDepth,
        ScoreTerm::ProcessorLoad,
        ScoreTerm::NetworkCost,
        ScoreTerm::LatencyCost,
        ScoreTerm::EnergyCost,
        ScoreTerm::PolicyCost,
    ];

    pub fn index(self) -> usize {
        match self {
            ScoreTerm::QueueDepth => 0,
            ScoreTerm::ProcessorLoad => 1,
            ScoreTerm::NetworkCost => 2,
            ScoreTerm::LatencyCost => 3,
            ScoreTerm::EnergyCost => 4,
            ScoreTerm::PolicyCost => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScoreTerm::QueueDepth => "queue_depth",
            ScoreTerm::ProcessorLoad => "processor_load",
            ScoreTerm::NetworkCost => "network_cost",
            ScoreTerm::LatencyCost => "latency_cost",
            ScoreTerm::EnergyCost => "energy_cost",
            ScoreTerm::PolicyCost => "policy_cost",
        }
    }
}

impl std::fmt::Display for ScoreTerm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The weight vector, always on the probability simplex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveWeights([f64; TERM_COUNT]);

impl Default for AdaptiveWeights {
    fn default() -> Self {
        Self::uniform()
    }
}

impl AdaptiveWeights {
    /// Uniform weights, 1/6 each.
    pub fn uniform() -> Self {
        Self([1.0 / TERM_COUNT as f64; TERM_COUNT])
    }

    /// Seed weights from deployment goals.
    ///
    /// Goal metrics map onto terms (latency → latency cost, data movement
    /// → network cost, energy → energy cost, throughput → queue depth,
    /// compute cost → processor load); a uniform base keeps unaddressed
    /// terms alive.
    pub fn from_goals(goals: &[OptimizationGoal]) -> Self {
        let mut values = [0.4 / TERM_COUNT as f64; TERM_COUNT];
        for goal in goals {
            let term = match goal.metric {
                GoalMetric::Latency => ScoreTerm::LatencyCost,
                GoalMetric::DataMovement => ScoreTerm::NetworkCost,
                GoalMetric::Energy => ScoreTerm::EnergyCost,
                GoalMetric::Throughput => ScoreTerm::QueueDepth,
                GoalMetric::ComputeCost => ScoreTerm::ProcessorLoad,
            };
            values[term.index()] += 0.6 * goal.weight;
        }
        project_to_simplex(&mut values);
        Self(values)
    }

    pub fn get(&self, term: ScoreTerm) -> f64 {
        self.0[term.index()]
    }

    pub fn values(&self) -> [f64; TERM_COUNT] {
        self.0
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    /// Non-negative and sum within ±0.01 of 1.
    pub fn is_healthy(&self) -> bool {
        is_on_simplex(&self.0, SIMPLEX_TOLERANCE)
    }
}

/// Fractional responsibility per term, non-negative and summing to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attribution([f64; TERM_COUNT]);

impl Attribution {
    /// Build from per-term shares; rejects negative or empty attribution
    /// and normalizes the rest to sum 1.
    pub fn new(shares: &[(ScoreTerm, f64)]) -> Result<Self> {
        let mut values = [0.0; TERM_COUNT];
        for (term, share) in shares {
            if share.is_nan() || *share < 0.0 {
                return Err(Error::CorruptOutcome(format!(
                    "negative attribution {} for {}",
                    share, term
                )));
            }
            values[term.index()] += share;
        }
        let sum: f64 = values.iter().sum();
        if sum <= 0.0 {
            return Err(Error::CorruptOutcome("attribution sums to zero".into()));
        }
        for v in &mut values {
            *v /= sum;
        }
        Ok(Self(values))
    }

    /// All responsibility on a single term.
    pub fn single(term: ScoreTerm) -> Self {
        let mut values = [0.0; TERM_COUNT];
        values[term.index()] = 1.0;
        Self(values)
    }

    pub fn get(&self, term: ScoreTerm) -> f64 {
        self.0[term.index()]
    }
}

/// Gradient adapter over the scoring weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightAdapter {
    weights: AdaptiveWeights,
    /// Rolling reward baseline ("expected").
    baseline: Ewma,
    eta: f64,
    pending: usize,
    /// Snapshot at the last successful projection, for drift revert.
    last_projected: AdaptiveWeights,
    batch_deltas: VecDeque<f64>,
    batches_applied: u64,
}

impl WeightAdapter {
    pub fn new(initial: AdaptiveWeights, learning_rate: f64) -> Self {
        Self {
            weights: initial,
            baseline: Ewma::new(BASELINE_ALPHA),
            eta: learning_rate,
            pending: 0,
            last_projected: initial,
            batch_deltas: VecDeque::with_capacity(CONVERGENCE_WINDOW),
            batches_applied: 0,
        }
    }

    pub fn weights(&self) -> &AdaptiveWeights {
        &self.weights
    }

    pub fn baseline(&self) -> f64 {
        self.baseline.value()
    }

    pub fn batches_applied(&self) -> u64 {
        self.batches_applied
    }

    /// Apply one attributed outcome.
    ///
    /// Each term moves by `eta * attribution * (reward - baseline)`,
    /// floored at zero. Projection back onto the simplex happens per
    /// batch, or immediately if the sum drifts past tolerance.
    pub fn apply(&mut self, attribution: &Attribution, reward: f64) -> Result<()> {
        if reward.is_nan() {
            return Err(Error::CorruptOutcome("reward is NaN".into()));
        }
        let advantage = reward - self.baseline.value();
        let mut values = self.weights.0;
        for term in ScoreTerm::ALL {
            let i = term.index();
            values[i] = (values[i] + self.eta * attribution.get(term) * advantage).max(0.0);
        }
        self.weights = AdaptiveWeights(values);
        self.baseline.update(reward);
        self.pending += 1;

        if self.pending >= BATCH_SIZE || !self.weights.is_healthy() {
            self.project()?;
        }
        Ok(())
    }

    /// Project onto the simplex and record the batch delta.
    ///
    /// If the vector is somehow still off the simplex afterwards, the
    /// whole batch reverts to the last good projection.
    fn project(&mut self) -> Result<()> {
        let before = self.last_projected;
        let pre_sum = self.weights.sum();
        let mut values = self.weights.0;
        project_to_simplex(&mut values);
        let projected = AdaptiveWeights(values);

        if !projected.is_healthy() {
            self.weights = before;
            self.pending = 0;
            return Err(Error::NumericDrift { sum: pre_sum });
        }

        let delta = l2_distance(&before.0, &projected.0);
        if self.batch_deltas.len() >= CONVERGENCE_WINDOW {
            self.batch_deltas.pop_front();
        }
        self.batch_deltas.push_back(delta);

        self.weights = projected;
        self.last_projected = projected;
        self.pending = 0;
        self.batches_applied += 1;
        Ok(())
    }

    /// Whether the last `CONVERGENCE_WINDOW` batches all moved less than
    /// the threshold.
    pub fn is_converged(&self) -> bool {
        self.batch_deltas.len() == CONVERGENCE_WINDOW
            && self
                .batch_deltas
                .iter()
                .all(|d| *d < CONVERGENCE_THRESHOLD)
    }

    /// The weight-sum invariant for the health check.
    pub fn is_healthy(&self) -> bool {
        self.weights.is_healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn uniform_weights_are_healthy() {
        let w = AdaptiveWeights::uniform();
        assert!(w.is_healthy());
        assert!((w.get(ScoreTerm::QueueDepth) - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn goal_seeding_shifts_mass_toward_named_terms() {
        let goals = vec![
            OptimizationGoal::minimize(GoalMetric::Latency, 0.7),
            OptimizationGoal::minimize(GoalMetric::Energy, 0.3),
        ];
        let w = AdaptiveWeights::from_goals(&goals);
        assert!(w.is_healthy());
        assert!(w.get(ScoreTerm::LatencyCost) > w.get(ScoreTerm::EnergyCost));
        assert!(w.get(ScoreTerm::EnergyCost) > w.get(ScoreTerm::QueueDepth));
        // Unaddressed terms keep some mass.
        assert!(w.get(ScoreTerm::PolicyCost) > 0.0);
    }

    #[test]
    fn attribution_normalizes_and_rejects_negatives() {
        let a = Attribution::new(&[
            (ScoreTerm::QueueDepth, 2.0),
            (ScoreTerm::NetworkCost, 2.0),
        ])
        .unwrap();
        assert!((a.get(ScoreTerm::QueueDepth) - 0.5).abs() < 1e-12);

        let err = Attribution::new(&[(ScoreTerm::QueueDepth, -0.1)]).unwrap_err();
        assert_eq!(err.code(), 51);
        assert!(Attribution::new(&[]).is_err());
    }

    #[test]
    fn repeated_positive_reward_grows_the_attributed_weight() {
        // Attribution fully on queue depth, reward +1, 100 times: the
        // queue weight grows monotonically and the sum never leaves the
        // simplex tolerance.
        let mut adapter = WeightAdapter::new(AdaptiveWeights::uniform(), 0.001);
        let attribution = Attribution::single(ScoreTerm::QueueDepth);
        let mut prev = adapter.weights().get(ScoreTerm::QueueDepth);
        for _ in 0..100 {
            adapter.apply(&attribution, 1.0).unwrap();
            let w = adapter.weights();
            let current = w.get(ScoreTerm::QueueDepth);
            assert!(current >= prev - 1e-12, "queue weight regressed");
            assert!(
                (0.99..=1.01).contains(&w.sum()),
                "sum {} left the simplex tolerance",
                w.sum()
            );
            prev = current;
        }
        assert!(adapter.weights().get(ScoreTerm::QueueDepth) > 1.0 / 6.0);
    }

    #[test]
    fn baseline_tracks_rewards() {
        let mut adapter = WeightAdapter::new(AdaptiveWeights::uniform(), 0.001);
        let attribution = Attribution::single(ScoreTerm::LatencyCost);
        for _ in 0..50 {
            adapter.apply(&attribution, 0.8).unwrap();
        }
        assert!((adapter.baseline() - 0.8).abs() < 0.01);
    }

    #[test]
    fn stable_rewards_converge() {
        let mut adapter = WeightAdapter::new(AdaptiveWeights::uniform(), 0.001);
        let attribution = Attribution::single(ScoreTerm::EnergyCost);
        for _ in 0..200 {
            adapter.apply(&attribution, 0.5).unwrap();
        }
        assert!(adapter.is_converged());
        assert!(adapter.batches_applied() >= CONVERGENCE_WINDOW as u64);
    }

    #[test]
    fn nan_reward_is_rejected() {
        let mut adapter = WeightAdapter::new(AdaptiveWeights::uniform(), 0.001);
        let attribution = Attribution::single(ScoreTerm::QueueDepth);
        assert!(adapter.apply(&attribution, f64::NAN).is_err());
        assert!(adapter.is_healthy());
    }

    proptest! {
        #[test]
        fn weight_sum_invariant_holds_for_any_update_sequence(
            rewards in proptest::collection::vec(-1.0f64..1.0, 1..120),
            term_picks in proptest::collection::vec(0usize..TERM_COUNT, 1..120),
        ) {
            let mut adapter = WeightAdapter::new(AdaptiveWeights::uniform(), 0.001);
            for (reward, pick) in rewards.iter().zip(term_picks.iter().cycle()) {
                let attribution = Attribution::single(ScoreTerm::ALL[*pick]);
                adapter.apply(&attribution, *reward).unwrap();
                let w = adapter.weights();
                prop_assert!((0.99..=1.01).contains(&w.sum()));
                prop_assert!(w.values().iter().all(|v| *v >= 0.0));
            }
        }
    }
}
