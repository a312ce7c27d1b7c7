//! Multi-objective scoring of (process, executor) pairs.
//!
//! Six bounded terms are weighted by the adaptive weight vector, shaped
//! by the active strategy's multiplier profile, topped up by validated
//! pattern and action-value bonuses, discounted by downstream DAG
//! transfer estimates, and finally pulled toward the data by the gravity
//! exponent. The winner is the maximum final score; ties break by lower
//! latency, then cheaper compute, then stable id order.

pub mod gravity;

use serde::Serialize;

use cpo_common::{locality_score, Executor, Process, Zone};
use cpo_config::DeploymentProfile;
use cpo_math::clamp_unit;

use crate::adapt::patterns::{ContextSignature, PatternStore};
use crate::adapt::strategy::Strategy;
use crate::adapt::value::{PlacementAction, StateBucket, ValueLearner};
use crate::adapt::weights::{AdaptiveWeights, ScoreTerm, TERM_COUNT};
use crate::metrics::MetricsVector;
use crate::policy::PolicyFilter;
use gravity::{normalized, TransferCostModel};

/// Transfer cost at which the network term halves, dollars.
const NETWORK_COST_SCALE_USD: f64 = 1.0;
/// Latency at which the latency term halves, milliseconds.
const LATENCY_SCALE_MS: f64 = 100.0;
/// Energy cost at which the energy term halves, dollars.
const ENERGY_COST_SCALE_USD: f64 = 0.01;
/// Downstream transfer cost at which the DAG penalty halves, dollars.
const DOWNSTREAM_COST_SCALE_USD: f64 = 1.0;
/// Default latency tolerance for latency-sensitive processes, ms.
const DEFAULT_LATENCY_TOLERANCE_MS: f64 = 250.0;
/// Scores closer than this are ties.
const SCORE_EPSILON: f64 = 1e-9;

/// Read-only learner snapshot a decision scores against.
#[derive(Clone, Copy)]
pub struct ScoreContext<'a> {
    pub weights: &'a AdaptiveWeights,
    pub strategy: Strategy,
    pub patterns: &'a PatternStore,
    pub values: &'a ValueLearner,
}

/// Full accounting of one scored pair.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoreBreakdown {
    /// Term values in `ScoreTerm::ALL` order.
    pub terms: [f64; TERM_COUNT],
    pub weighted_sum: f64,
    pub pattern_bonus: f64,
    pub value_bonus: f64,
    pub downstream_penalty: f64,
    /// Locality of the target to the input data.
    pub locality: f64,
    pub final_score: f64,
}

/// The placement scorer.
#[derive(Debug, Clone, Copy)]
pub struct Scorer {
    pub transfer: TransferCostModel,
    /// Gravity exponent g: 0 ignores locality, 1 lets it dominate.
    pub data_gravity_factor: f64,
    pub latency_tolerance_ms: f64,
}

impl Scorer {
    pub fn from_profile(profile: &DeploymentProfile) -> Self {
        Self {
            transfer: TransferCostModel::default(),
            data_gravity_factor: profile.learning.data_gravity_factor,
            latency_tolerance_ms: DEFAULT_LATENCY_TOLERANCE_MS,
        }
    }

    /// Rough energy draw of running `process`, watt-hours.
    fn estimated_energy_wh(process: &Process) -> f64 {
        let cores = (process.conditions.min_cpu_millicores.max(1000) as f64) / 1000.0;
        let gpu_draw = if process.conditions.requires_gpu { 50.0 } else { 0.0 };
        5.0 + cores * 10.0 + gpu_draw
    }

    /// Score one candidate. `policy_adjustment` is the (non-positive)
    /// soft-rule penalty from the policy filter.
    pub fn score(
        &self,
        process: &Process,
        executor: &Executor,
        metrics: &MetricsVector,
        context: ScoreContext<'_>,
        policy_adjustment: f64,
    ) -> ScoreBreakdown {
        let pressure = metrics.pressure();
        let executor_location = executor.data_location();

        // Offloading relieves pressure only when the target is remote and
        // there is a queue to relieve.
        let queue_term = if executor.zone() != Zone::Local && metrics.queue_depth > 0 {
            clamp_unit(1.0 - pressure)
        } else {
            0.0
        };

        let load_term = clamp_unit(1.0 - executor.utilization.dominant_load());

        let transfer_cost = self.transfer.transfer_cost(
            &metrics.data_location,
            &executor_location,
            metrics.pending_data_gb,
        );
        let network_term = 1.0 - normalized(transfer_cost, NETWORK_COST_SCALE_USD);

        let latency_term = if process.hints.latency_sensitive
            && executor.network_latency_ms > self.latency_tolerance_ms
        {
            0.0
        } else {
            1.0 - normalized(executor.network_latency_ms, LATENCY_SCALE_MS)
        };

        let energy_cost = executor.cost.energy_per_wh * Self::estimated_energy_wh(process);
        let energy_term = 1.0 - normalized(energy_cost, ENERGY_COST_SCALE_USD);

        let policy_term = policy_adjustment.min(0.0);

        let terms = [
            queue_term,
            load_term,
            network_term,
            latency_term,
            energy_term,
            policy_term,
        ];

        let weighted_sum: f64 = ScoreTerm::ALL
            .iter()
            .map(|term| {
                context.weights.get(*term)
                    * terms[term.index()]
                    * context.strategy.multiplier(*term)
            })
            .sum();

        let action = PlacementAction::for_zone(executor.zone());
        let pattern_bonus = context
            .patterns
            .bonus(&ContextSignature::from_metrics(metrics), action);
        let value_bonus = context
            .values
            .bonus(StateBucket::from_metrics(metrics), action);

        let downstream_penalty = match &metrics.dag {
            Some(dag) => {
                let total: f64 = dag
                    .downstream
                    .iter()
                    .map(|stage| {
                        self.transfer.transfer_cost(
                            &executor_location,
                            &stage.preferred_location,
                            stage.input_size_gb,
                        )
                    })
                    .sum();
                normalized(total * dag.safety_factor, DOWNSTREAM_COST_SCALE_USD)
            }
            None => 0.0,
        };

        let locality = locality_score(&metrics.data_location, &executor_location);
        let pre_gravity = weighted_sum + pattern_bonus + value_bonus - downstream_penalty;
        let final_score = pre_gravity * locality.powf(self.data_gravity_factor);

        ScoreBreakdown {
            terms,
            weighted_sum,
            pattern_bonus,
            value_bonus,
            downstream_penalty,
            locality,
            final_score,
        }
    }

    /// Score every candidate and return the winner.
    ///
    /// Soft-rule penalties come from `policy`; candidates are assumed to
    /// have already passed hard filtering.
    pub fn pick_best(
        &self,
        process: &Process,
        metrics: &MetricsVector,
        candidates: &[Executor],
        context: ScoreContext<'_>,
        policy: &PolicyFilter,
    ) -> Option<(Executor, ScoreBreakdown)> {
        let mut best: Option<(&Executor, ScoreBreakdown)> = None;
        for executor in candidates {
            let verdict = policy.evaluate(process, executor);
            if !verdict.allowed {
                continue;
            }
            let breakdown = self.score(
                process,
                executor,
                metrics,
                context,
                verdict.score_adjustment,
            );
            best = match best {
                None => Some((executor, breakdown)),
                Some((incumbent, incumbent_score)) => {
                    if prefer(executor, &breakdown, incumbent, &incumbent_score) {
                        Some((executor, breakdown))
                    } else {
                        Some((incumbent, incumbent_score))
                    }
                }
            };
        }
        best.map(|(executor, breakdown)| (executor.clone(), breakdown))
    }
}

/// Whether `challenger` beats `incumbent`: higher score, then lower
/// latency, then cheaper compute, then smaller id.
fn prefer(
    challenger: &Executor,
    challenger_score: &ScoreBreakdown,
    incumbent: &Executor,
    incumbent_score: &ScoreBreakdown,
) -> bool {
    let delta = challenger_score.final_score - incumbent_score.final_score;
    if delta.abs() > SCORE_EPSILON {
        return delta > 0.0;
    }
    if (challenger.network_latency_ms - incumbent.network_latency_ms).abs() > f64::EPSILON {
        return challenger.network_latency_ms < incumbent.network_latency_ms;
    }
    if (challenger.cost.compute_per_hour - incumbent.cost.compute_per_hour).abs() > f64::EPSILON {
        return challenger.cost.compute_per_hour < incumbent.cost.compute_per_hour;
    }
    challenger.id < incumbent.id
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cpo_common::{
        Capabilities, CostCoefficients, DataLocation, DataRequirements, ExecutorId, ExecutorState,
        ExecutorType, GeoLocation, HardwareSpec, ProcessId, ProcessState, ResourceHints,
        SoftwareSpec, Utilization,
    };
    use cpo_config::DeploymentType;

    use crate::metrics::{DagContext, DagStage};

    fn executor(id: &str, executor_type: ExecutorType) -> Executor {
        Executor {
            id: ExecutorId::from(id),
            executor_type,
            location: GeoLocation::new(0.0, 0.0, id),
            region: None,
            capabilities: Capabilities {
                hardware: HardwareSpec {
                    cpu_millicores: 16_000,
                    memory_bytes: 32 << 30,
                    storage_bytes: 1 << 40,
                    gpus: vec![],
                },
                software: SoftwareSpec {
                    image: "colony/runtime:1.2".into(),
                    kind: "container".into(),
                    version: "1.2.0".into(),
                },
            },
            state: ExecutorState::Approved,
            last_seen: Utc::now(),
            utilization: Utilization::zero(),
            reliability: 0.95,
            cost: CostCoefficients {
                compute_per_hour: 0.10,
                energy_per_wh: 0.0002,
                network_per_gb: 0.02,
            },
            security_level: 5,
            jurisdiction: None,
            network_latency_ms: 20.0,
        }
    }

    fn process(id: &str) -> Process {
        Process {
            id: ProcessId::from(id),
            func_name: "train_epoch".into(),
            args: vec![],
            kwargs: Default::default(),
            conditions: Default::default(),
            priority: 0,
            wait_deadline: None,
            exec_deadline: None,
            data: DataRequirements {
                input_size_gb: 4.0,
                input_location: DataLocation::new(Zone::Cloud),
                output_location: None,
                sensitive: false,
            },
            hints: ResourceHints::default(),
            safety_critical: false,
            locality_required: false,
            submitted_at: Utc::now(),
            started_at: None,
            ended_at: None,
            state: ProcessState::Waiting,
        }
    }

    fn metrics(data_zone: Zone, pending_gb: f64) -> MetricsVector {
        let mut m = MetricsVector::at(Utc::now(), 6, 20, DataLocation::new(data_zone), pending_gb);
        m.queue_depth = 6;
        m
    }

    struct Fixture {
        weights: AdaptiveWeights,
        patterns: PatternStore,
        values: ValueLearner,
        policy: PolicyFilter,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                weights: AdaptiveWeights::uniform(),
                patterns: PatternStore::new(),
                values: ValueLearner::new(true, 0.9, 0.0, 64),
                policy: PolicyFilter::with_default_rules(),
            }
        }

        fn context(&self) -> ScoreContext<'_> {
            ScoreContext {
                weights: &self.weights,
                strategy: Strategy::Balanced,
                patterns: &self.patterns,
                values: &self.values,
            }
        }
    }

    fn scorer(gravity: f64) -> Scorer {
        let mut profile = DeploymentProfile::preset(DeploymentType::Hybrid);
        profile.learning.data_gravity_factor = gravity;
        Scorer::from_profile(&profile)
    }

    #[test]
    fn all_terms_are_bounded() {
        let fixture = Fixture::new();
        let breakdown = scorer(0.5).score(
            &process("p"),
            &executor("e", ExecutorType::Cloud),
            &metrics(Zone::Cloud, 2.0),
            fixture.context(),
            -0.1,
        );
        for (i, term) in breakdown.terms.iter().enumerate() {
            if i == ScoreTerm::PolicyCost.index() {
                assert!(*term <= 0.0);
            } else {
                assert!((0.0..=1.0).contains(term), "term {} = {}", i, term);
            }
        }
    }

    #[test]
    fn loaded_executor_scores_below_idle_one() {
        let fixture = Fixture::new();
        let s = scorer(0.0);
        let m = metrics(Zone::Cloud, 2.0);
        let p = process("p");
        let idle = executor("e-idle", ExecutorType::Cloud);
        let mut busy = executor("e-busy", ExecutorType::Cloud);
        busy.utilization.compute = 0.9;
        let idle_score = s.score(&p, &idle, &m, fixture.context(), 0.0);
        let busy_score = s.score(&p, &busy, &m, fixture.context(), 0.0);
        assert!(idle_score.final_score > busy_score.final_score);
    }

    #[test]
    fn gravity_one_lets_data_dominate() {
        // Identical candidates except location; data sits in the cloud.
        let fixture = Fixture::new();
        let s = scorer(1.0);
        let m = metrics(Zone::Cloud, 8.0);
        let p = process("p");
        let cloud = executor("e-cloud", ExecutorType::Cloud);
        let edge = executor("e-edge", ExecutorType::Edge);
        let (winner, _) = s
            .pick_best(&p, &m, &[edge, cloud], fixture.context(), &fixture.policy)
            .unwrap();
        assert_eq!(winner.id.0, "e-cloud");
    }

    #[test]
    fn gravity_zero_ignores_locality() {
        let fixture = Fixture::new();
        let s = scorer(0.0);
        let m = metrics(Zone::Cloud, 8.0);
        let p = process("p");
        let cloud = executor("e-cloud", ExecutorType::Cloud);
        let mut edge = executor("e-edge", ExecutorType::Edge);
        // Give the remote candidate a decisive latency advantage.
        edge.network_latency_ms = 1.0;
        let cloud_score = s.score(&p, &cloud, &m, fixture.context(), 0.0);
        let edge_score = s.score(&p, &edge, &m, fixture.context(), 0.0);
        assert_eq!(cloud_score.locality, 1.0);
        assert_eq!(edge_score.locality, 0.1);
        // With g=0 the locality multiplier is 1: the final score is
        // exactly the pre-gravity sum for both candidates.
        for breakdown in [&cloud_score, &edge_score] {
            let pre_gravity = breakdown.weighted_sum + breakdown.pattern_bonus
                + breakdown.value_bonus
                - breakdown.downstream_penalty;
            assert!((breakdown.final_score - pre_gravity).abs() < 1e-12);
        }
    }

    #[test]
    fn latency_sensitive_process_zeroes_slow_targets() {
        let fixture = Fixture::new();
        let s = scorer(0.5);
        let m = metrics(Zone::Cloud, 2.0);
        let mut p = process("p");
        p.hints.latency_sensitive = true;
        let mut slow = executor("e-slow", ExecutorType::Cloud);
        slow.network_latency_ms = 400.0;
        let breakdown = s.score(&p, &slow, &m, fixture.context(), 0.0);
        assert_eq!(breakdown.terms[ScoreTerm::LatencyCost.index()], 0.0);
    }

    #[test]
    fn downstream_stages_penalize_distant_targets() {
        let fixture = Fixture::new();
        let s = scorer(0.0);
        let p = process("p");
        let mut m = metrics(Zone::Cloud, 2.0);
        m.dag = Some(DagContext {
            current_stage: 0,
            total_stages: 2,
            downstream: vec![DagStage {
                preferred_location: DataLocation::new(Zone::Cloud),
                input_size_gb: 50.0,
                compute_millicores: 8000,
            }],
            safety_factor: 1.5,
        });
        let near = executor("e-cloud", ExecutorType::Cloud);
        let far = executor("e-edge", ExecutorType::Edge);
        let near_score = s.score(&p, &near, &m, fixture.context(), 0.0);
        let far_score = s.score(&p, &far, &m, fixture.context(), 0.0);
        assert_eq!(near_score.downstream_penalty, 0.0);
        assert!(far_score.downstream_penalty > 0.0);
    }

    #[test]
    fn queue_term_is_zero_for_local_targets() {
        let fixture = Fixture::new();
        let s = scorer(0.0);
        let local = executor("e-local", ExecutorType::Local);
        let remote = executor("e-cloud", ExecutorType::Cloud);
        let m = metrics(Zone::Local, 1.0);
        let local_score = s.score(&process("p"), &local, &m, fixture.context(), 0.0);
        let remote_score = s.score(&process("p"), &remote, &m, fixture.context(), 0.0);
        assert_eq!(local_score.terms[ScoreTerm::QueueDepth.index()], 0.0);
        assert!(remote_score.terms[ScoreTerm::QueueDepth.index()] > 0.0);
    }

    #[test]
    fn ties_break_by_latency_then_cost_then_id() {
        let fixture = Fixture::new();
        let s = scorer(0.0);
        let m = metrics(Zone::Cloud, 0.0);
        let p = process("p");

        let a = executor("e-a", ExecutorType::Cloud);
        let mut b = executor("e-b", ExecutorType::Cloud);
        b.network_latency_ms = 10.0;
        let (winner, _) = s
            .pick_best(&p, &m, &[a.clone(), b], fixture.context(), &fixture.policy)
            .unwrap();
        assert_eq!(winner.id.0, "e-b");

        let mut c = executor("e-c", ExecutorType::Cloud);
        c.cost.compute_per_hour = 0.05;
        let (winner, _) = s
            .pick_best(&p, &m, &[a.clone(), c], fixture.context(), &fixture.policy)
            .unwrap();
        assert_eq!(winner.id.0, "e-c");

        let d = executor("e-d", ExecutorType::Cloud);
        let (winner, _) = s
            .pick_best(&p, &m, &[d, a], fixture.context(), &fixture.policy)
            .unwrap();
        assert_eq!(winner.id.0, "e-a");
    }

    #[test]
    fn soft_penalties_can_flip_the_winner() {
        let fixture = Fixture::new();
        let s = scorer(0.0);
        let m = metrics(Zone::Cloud, 0.0);
        let p = process("p");
        let clean = executor("e-clean", ExecutorType::Cloud);
        let mut pricy = executor("e-pricy", ExecutorType::Cloud);
        // Violates prefer-cheap-compute; otherwise identical.
        pricy.cost.compute_per_hour = 0.90;
        let (winner, _) = s
            .pick_best(
                &p,
                &m,
                &[pricy, clean],
                fixture.context(),
                &fixture.policy,
            )
            .unwrap();
        assert_eq!(winner.id.0, "e-clean");
    }

    #[test]
    fn empty_candidate_list_yields_none() {
        let fixture = Fixture::new();
        let s = scorer(0.5);
        assert!(s
            .pick_best(
                &process("p"),
                &metrics(Zone::Cloud, 1.0),
                &[],
                fixture.context(),
                &fixture.policy,
            )
            .is_none());
    }
}
