//! The orchestrator: assignment, metrics, and adaptation loops.
//!
//! Three long-running threads cooperate over shared state:
//!
//! 1. **Assignment** pulls a waiting process, snapshots the metrics
//!    vector, runs safety gate → policy filter → scorer, and dispatches.
//! 2. **Metrics** refreshes executor and queue snapshots from the colony.
//! 3. **Adaptation** drives weight batches, pattern scans, value-table
//!    eviction, posterior decay, and decision timeouts.
//!
//! Decisions take the reader side of the adaptive-state guard; outcome
//! application takes the writer side and is serialized in arrival order.
//! A counting semaphore caps in-flight offloads; when it is saturated
//! the assignment loop skips the tick instead of queueing.

pub mod decision;
pub mod outcome;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;

use cpo_common::{DecisionId, Error, Executor, Process, Result, RunId};
use cpo_config::{validate_profile, DeploymentProfile};

use crate::adapt::{AdaptiveState, DecisionContext};
use crate::audit::{AuditEventType, AuditLog};
use crate::colony::{ColonyClient, ColonyExecutor};
use crate::metrics::MetricsVector;
use crate::policy::{PolicyFilter, SafetyGate};
use crate::queue::{QueueAnalyzer, QueueSignals};
use crate::scoring::{ScoreContext, Scorer};
use decision::{Decision, DecisionState, DecisionTracker, ForcedCause, OutcomeIngest};
use outcome::ProcessOutcome;

/// How often sleeping loops check for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(50);
/// The adaptation loop runs at this multiple of the metrics interval.
const ADAPTATION_INTERVAL_FACTOR: f64 = 10.0;

/// Cooperative cancellation shared by every loop.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Counting semaphore capping in-flight offloads.
#[derive(Debug)]
struct Semaphore {
    capacity: usize,
    available: Mutex<usize>,
}

impl Semaphore {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            available: Mutex::new(capacity),
        }
    }

    /// Take a permit if one is free; never blocks.
    fn try_acquire(&self) -> bool {
        let mut available = self.available.lock().expect("semaphore lock poisoned");
        if *available == 0 {
            return false;
        }
        *available -= 1;
        true
    }

    fn release(&self) {
        let mut available = self.available.lock().expect("semaphore lock poisoned");
        *available = (*available + 1).min(self.capacity);
    }

    fn in_use(&self) -> usize {
        let available = self.available.lock().expect("semaphore lock poisoned");
        self.capacity - *available
    }
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    local_forced: AtomicU64,
    policy_blocked: AtomicU64,
    safety_blocked: AtomicU64,
    outcomes_dropped: AtomicU64,
    duplicates_ignored: AtomicU64,
    backpressure_skips: AtomicU64,
    transient_errors: AtomicU64,
    invalid_inputs: AtomicU64,
}

impl Counters {
    fn bump(field: &AtomicU64) {
        field.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of orchestrator statistics for the analytics collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStats {
    pub run_id: RunId,
    pub uptime_secs: f64,
    pub in_flight: usize,
    pub queue: QueueSignals,
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub local_forced: u64,
    pub policy_blocked: u64,
    pub safety_blocked: u64,
    pub outcomes_dropped: u64,
    pub duplicates_ignored: u64,
    pub backpressure_skips: u64,
    pub transient_errors: u64,
    pub invalid_inputs: u64,
    pub outcomes_applied: u64,
}

/// Structured health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub weights_healthy: bool,
    pub weight_sum: f64,
    pub weights_converged: bool,
    pub bandit_healthy: bool,
    /// Seconds since the last successful metrics refresh.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_age_secs: Option<i64>,
}

/// Disposition of a submitted outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeDisposition {
    /// Learned from; carries the scalar reward.
    Applied { reward: f64 },
    /// Already applied earlier; no-op.
    Duplicate,
    /// No decision matches; dropped with a metric.
    Unknown,
}

struct Shared {
    profile: DeploymentProfile,
    client: Arc<dyn ColonyClient>,
    local_executor: Executor,
    run_id: RunId,
    scorer: Scorer,
    safety: SafetyGate,
    adaptive: RwLock<AdaptiveState>,
    policy: RwLock<PolicyFilter>,
    tracker: Mutex<DecisionTracker>,
    analyzer: Mutex<QueueAnalyzer>,
    audit: Mutex<AuditLog>,
    latest_metrics: Mutex<Option<MetricsVector>>,
    executors: Mutex<Vec<Executor>>,
    semaphore: Semaphore,
    counters: Counters,
    cancel: CancellationToken,
    started_at: Mutex<Option<DateTime<Utc>>>,
    last_refresh: Mutex<Option<DateTime<Utc>>>,
}

/// The decision and adaptation engine.
pub struct Orchestrator {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Construct against a validated profile. Validation failures are
    /// fatal at boot.
    pub fn new(
        profile: DeploymentProfile,
        client: Arc<dyn ColonyClient>,
        local_executor: Executor,
    ) -> Result<Self> {
        validate_profile(&profile).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let now = Utc::now();
        let run_id = RunId::new();
        let shared = Shared {
            scorer: Scorer::from_profile(&profile),
            safety: SafetyGate::new(profile.safety, profile.behavior.max_concurrent_processes),
            adaptive: RwLock::new(AdaptiveState::from_profile(&profile, now)),
            policy: RwLock::new(PolicyFilter::with_default_rules()),
            tracker: Mutex::new(DecisionTracker::new()),
            analyzer: Mutex::new(QueueAnalyzer::with_cusum(
                profile.behavior.queue_threshold,
                profile.algorithm.cusum_drift,
                profile.algorithm.cusum_threshold,
            )),
            audit: Mutex::new(AuditLog::new(run_id)),
            latest_metrics: Mutex::new(None),
            executors: Mutex::new(Vec::new()),
            semaphore: Semaphore::new(profile.behavior.max_concurrent_processes),
            counters: Counters::default(),
            cancel: CancellationToken::new(),
            started_at: Mutex::new(None),
            last_refresh: Mutex::new(None),
            profile,
            client,
            local_executor,
            run_id,
        };
        Ok(Self {
            shared: Arc::new(shared),
            handles: Vec::new(),
        })
    }

    pub fn run_id(&self) -> RunId {
        self.shared.run_id
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Register with the colony, lock the policy filter, and launch the
    /// three loops.
    pub fn start(&mut self) -> Result<()> {
        if !self.handles.is_empty() {
            return Err(Error::InvalidInput("orchestrator already started".into()));
        }
        let shared = &self.shared;
        shared
            .client
            .register_executor(&ColonyExecutor::from(&shared.local_executor))?;
        shared.policy.write().expect("policy lock poisoned").lock();
        *shared.started_at.lock().expect("started_at lock poisoned") = Some(Utc::now());
        shared.audit.lock().expect("audit lock poisoned").append(
            AuditEventType::Lifecycle,
            None,
            vec![],
            "orchestrator started",
            None,
        );
        tracing::info!(run_id = %shared.run_id, "orchestrator started");

        let assign_interval =
            Duration::from_secs_f64(shared.profile.behavior.assign_interval_s);
        let metrics_interval =
            Duration::from_secs_f64(shared.profile.behavior.metrics_update_interval_s);
        let adaptation_interval = Duration::from_secs_f64(
            shared.profile.behavior.metrics_update_interval_s * ADAPTATION_INTERVAL_FACTOR,
        );

        let s = Arc::clone(&self.shared);
        self.handles.push(std::thread::spawn(move || {
            run_loop(&s.cancel.clone(), assign_interval, || {
                if let Err(e) = s.assign_tick(Utc::now()) {
                    tracing::warn!(error = %e, "assignment tick failed");
                }
            });
        }));

        let s = Arc::clone(&self.shared);
        self.handles.push(std::thread::spawn(move || {
            run_loop(&s.cancel.clone(), metrics_interval, || {
                if let Err(e) = s.metrics_tick(Utc::now()) {
                    tracing::warn!(error = %e, "metrics tick failed");
                }
            });
        }));

        let s = Arc::clone(&self.shared);
        self.handles.push(std::thread::spawn(move || {
            run_loop(&s.cancel.clone(), adaptation_interval, || {
                s.adaptation_tick(Utc::now());
            });
        }));

        Ok(())
    }

    /// Cancel, drain the loops, unlock policy, and unregister.
    pub fn stop(&mut self) {
        let shared = &self.shared;
        shared.cancel.cancel();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        shared.policy.write().expect("policy lock poisoned").unlock();
        if let Err(e) = shared
            .client
            .unregister_executor(&shared.local_executor.id.0)
        {
            tracing::warn!(error = %e, "unregister failed");
        }
        shared.audit.lock().expect("audit lock poisoned").append(
            AuditEventType::Lifecycle,
            None,
            vec![],
            "orchestrator stopped",
            None,
        );
        tracing::info!(run_id = %shared.run_id, "orchestrator stopped");
    }

    /// One assignment-loop iteration: pull, decide, dispatch.
    pub fn run_assignment_tick(&self, now: DateTime<Utc>) -> Result<Option<DecisionId>> {
        self.shared.assign_tick(now)
    }

    /// One metrics-loop iteration: refresh snapshots and queue signals.
    pub fn run_metrics_tick(&self, now: DateTime<Utc>) -> Result<()> {
        self.shared.metrics_tick(now)
    }

    /// One adaptation-loop iteration: learner maintenance and timeouts.
    pub fn run_adaptation_tick(&self, now: DateTime<Utc>) {
        self.shared.adaptation_tick(now)
    }

    /// The pure decision pipeline over explicit inputs.
    pub fn place(
        &self,
        process: Process,
        metrics: MetricsVector,
        executors: &[Executor],
        now: DateTime<Utc>,
    ) -> Result<Decision> {
        self.shared.place(process, metrics, executors, now)
    }

    /// Apply one completion callback.
    pub fn submit_outcome(&self, outcome: ProcessOutcome) -> Result<OutcomeDisposition> {
        self.shared.handle_outcome(outcome, Utc::now())
    }

    pub fn stats(&self) -> OrchestratorStats {
        self.shared.stats(Utc::now())
    }

    pub fn health(&self) -> HealthReport {
        self.shared.health(Utc::now())
    }

    /// Recent audit entries, oldest first.
    pub fn audit_entries(&self) -> Vec<crate::audit::AuditEntry> {
        self.shared
            .audit
            .lock()
            .expect("audit lock poisoned")
            .entries()
    }
}

/// Tick `body` every `interval` until cancelled, observing cancellation
/// between sub-second sleeps.
fn run_loop(cancel: &CancellationToken, interval: Duration, mut body: impl FnMut()) {
    while !cancel.is_cancelled() {
        body();
        let mut slept = Duration::ZERO;
        while slept < interval {
            if cancel.is_cancelled() {
                return;
            }
            let chunk = CANCEL_POLL.min(interval - slept);
            std::thread::sleep(chunk);
            slept += chunk;
        }
    }
}

impl Shared {
    /// Build the metrics vector for one decision: the latest system
    /// snapshot specialized with the process's data requirements.
    fn decision_metrics(&self, process: &Process, now: DateTime<Utc>) -> MetricsVector {
        let signals = self
            .analyzer
            .lock()
            .expect("analyzer lock poisoned")
            .signals();
        let mut metrics = self
            .latest_metrics
            .lock()
            .expect("metrics lock poisoned")
            .clone()
            .unwrap_or_else(|| {
                MetricsVector::at(
                    now,
                    signals.depth,
                    self.profile.behavior.queue_threshold,
                    process.data.input_location.clone(),
                    process.data.input_size_gb,
                )
            });
        metrics.data_location = process.data.input_location.clone();
        metrics.pending_data_gb = process.data.input_size_gb;
        let likely_target = process
            .data
            .output_location
            .clone()
            .unwrap_or_else(|| process.data.input_location.clone());
        metrics.transfer_cost_per_gb = self
            .scorer
            .transfer
            .cost_per_gb(&process.data.input_location, &likely_target);
        metrics.transfer_time_secs = self.scorer.transfer.transfer_time_secs(
            &process.data.input_location,
            &likely_target,
            process.data.input_size_gb,
        );
        metrics
    }

    /// The decision pipeline: safety gate → liveness → policy filter →
    /// strategy → scorer.
    fn place(
        &self,
        process: Process,
        metrics: MetricsVector,
        executors: &[Executor],
        now: DateTime<Utc>,
    ) -> Result<Decision> {
        metrics.validate()?;

        // One atomic read of the adaptive state for the whole decision.
        let adaptive = self.adaptive.read().expect("adaptive lock poisoned");
        let strategy = adaptive.choose_strategy(&mut rand::rng());

        let mut decision = Decision::new(
            DecisionContext {
                decision_id: DecisionId::new(),
                process,
                executor: None,
                metrics,
                strategy,
            },
            now,
        );

        let in_flight = self
            .tracker
            .lock()
            .expect("tracker lock poisoned")
            .in_flight_count();
        if let Err(gate) = self.safety.check(&decision.context.metrics.system, in_flight) {
            decision.force_local(ForcedCause::SafetyGate, format!("safety constraints: {gate}"), now)?;
            return Ok(decision);
        }

        let live: Vec<Executor> = executors
            .iter()
            .filter(|e| e.is_candidate(now))
            .cloned()
            .collect();

        let policy = self.policy.read().expect("policy lock poisoned");
        let viable = policy.filter(&decision.context.process, &live);
        decision.transition(DecisionState::Filtered, now)?;

        if viable.is_empty() {
            if live.is_empty() {
                decision.force_local(ForcedCause::NoCandidates, "no viable candidates", now)?;
            } else {
                let blocking = policy.blocking_rules(&decision.context.process, &live);
                let descriptions: Vec<&str> = policy
                    .rules()
                    .iter()
                    .filter(|r| blocking.contains(&r.id))
                    .map(|r| r.description.as_str())
                    .collect();
                let reason = if descriptions.is_empty() {
                    "no viable candidates".to_string()
                } else {
                    descriptions.join("; ")
                };
                decision.force_local(ForcedCause::PolicyBlocked, reason, now)?;
            }
            return Ok(decision);
        }

        let context = ScoreContext {
            weights: adaptive.weights.weights(),
            strategy,
            patterns: &adaptive.patterns,
            values: &adaptive.values,
        };
        match self.scorer.pick_best(
            &decision.context.process,
            &decision.context.metrics,
            &viable,
            context,
            &policy,
        ) {
            Some((target, breakdown)) => {
                decision.score = Some(breakdown);
                if decision.context.process.safety_critical {
                    decision.reason = Some("safety-critical must execute locally".into());
                } else if decision.context.process.locality_required {
                    decision.reason =
                        Some("locality-required restricts targets to local or edge".into());
                }
                decision.context.executor = Some(target);
                decision.transition(DecisionState::Scored, now)?;
                decision.transition(DecisionState::Dispatched, now)?;
                Ok(decision)
            }
            None => {
                decision.force_local(ForcedCause::NoCandidates, "no viable candidates", now)?;
                Ok(decision)
            }
        }
    }

    /// Assignment-loop body. Returns the new decision id, or `None` when
    /// backpressured or idle.
    fn assign_tick(&self, now: DateTime<Utc>) -> Result<Option<DecisionId>> {
        if !self.semaphore.try_acquire() {
            Counters::bump(&self.counters.backpressure_skips);
            return Ok(None);
        }

        let pull_timeout =
            Duration::from_secs_f64(self.profile.behavior.assign_interval_s.max(0.1));
        let wire = match self.client.assign_process(pull_timeout) {
            Ok(Some(wire)) => wire,
            Ok(None) => {
                self.semaphore.release();
                return Ok(None);
            }
            Err(e) => {
                self.semaphore.release();
                Counters::bump(&self.counters.transient_errors);
                return Err(e);
            }
        };

        let process_id = wire.process_id.clone();
        let process = match Process::try_from(wire) {
            Ok(process) => process,
            Err(e) => {
                self.semaphore.release();
                Counters::bump(&self.counters.invalid_inputs);
                let _ = self
                    .client
                    .fail_process(&process_id, &[format!("rejected by orchestrator: {e}")]);
                return Err(e);
            }
        };

        let metrics = self.decision_metrics(&process, now);
        let executors = self
            .executors
            .lock()
            .expect("executors lock poisoned")
            .clone();
        let decision = match self.place(process, metrics, &executors, now) {
            Ok(decision) => decision,
            Err(e) => {
                self.semaphore.release();
                Counters::bump(&self.counters.invalid_inputs);
                return Err(e);
            }
        };

        let id = decision.id().clone();
        let offload = decision.target().is_some();
        self.account_decision(&decision);
        self.audit.lock().expect("audit lock poisoned").append(
            AuditEventType::Decision,
            Some(id.clone()),
            vec![],
            format!(
                "{} {} -> {}",
                decision.state,
                decision.context.process.id,
                decision
                    .target()
                    .map(|e| e.id.0.clone())
                    .unwrap_or_else(|| "local".into()),
            ),
            decision
                .score
                .as_ref()
                .map(|s| serde_json::json!({"final_score": s.final_score, "locality": s.locality})),
        );

        if offload {
            let target = decision.target().expect("offload has a target");
            let _ = self.client.add_log(
                &decision.context.process.id.0,
                &format!("placement {}: dispatched to {}", id, target.id),
            );
            tracing::info!(
                decision_id = %id,
                target = %target.id,
                strategy = %decision.context.strategy,
                "dispatched"
            );
        } else {
            tracing::info!(
                decision_id = %id,
                reason = decision.reason.as_deref().unwrap_or(""),
                "forced local"
            );
        }

        self.tracker
            .lock()
            .expect("tracker lock poisoned")
            .insert(decision)?;
        if !offload {
            // Local executions do not hold an offload permit.
            self.semaphore.release();
        }
        Ok(Some(id))
    }

    fn account_decision(&self, decision: &Decision) {
        match decision.state {
            DecisionState::Dispatched => Counters::bump(&self.counters.dispatched),
            DecisionState::LocalForced => {
                Counters::bump(&self.counters.local_forced);
                match decision.forced_cause {
                    Some(ForcedCause::SafetyGate) => {
                        Counters::bump(&self.counters.safety_blocked);
                        self.audit.lock().expect("audit lock poisoned").append(
                            AuditEventType::SafetyGate,
                            Some(decision.id().clone()),
                            vec![],
                            decision.reason.clone().unwrap_or_default(),
                            None,
                        );
                    }
                    Some(ForcedCause::PolicyBlocked) | Some(ForcedCause::NoCandidates) => {
                        Counters::bump(&self.counters.policy_blocked);
                    }
                    None => {}
                }
            }
            _ => {}
        }
    }

    /// Metrics-loop body: refresh executors, statistics, and queue
    /// signals.
    fn metrics_tick(&self, now: DateTime<Utc>) -> Result<()> {
        let statistics = match self.client.get_statistics() {
            Ok(s) => s,
            Err(e) => {
                Counters::bump(&self.counters.transient_errors);
                return Err(e);
            }
        };
        if statistics.is_stale(now) {
            return Err(Error::StaleSnapshot {
                age_secs: statistics.age_secs(now),
            });
        }

        let wire_executors = match self.client.get_executors() {
            Ok(e) => e,
            Err(e) => {
                Counters::bump(&self.counters.transient_errors);
                return Err(e);
            }
        };
        let mut converted = Vec::with_capacity(wire_executors.len());
        for wire in wire_executors {
            match Executor::try_from(wire) {
                Ok(executor) => converted.push(executor),
                Err(e) => {
                    Counters::bump(&self.counters.invalid_inputs);
                    tracing::warn!(error = %e, "skipping malformed executor");
                }
            }
        }
        *self.executors.lock().expect("executors lock poisoned") = converted;

        let depth = statistics.waiting_processes as usize;
        let signals = self
            .analyzer
            .lock()
            .expect("analyzer lock poisoned")
            .update(depth, now);

        let mut metrics = MetricsVector::at(
            now,
            depth,
            self.profile.behavior.queue_threshold,
            self.local_executor.data_location(),
            0.0,
        );
        metrics.queue_wait_secs = statistics.avg_queue_time_ms / 1000.0;
        metrics.throughput_per_sec = statistics
            .trends_24h
            .last()
            .map(|t| t.completed as f64 / 3600.0)
            .unwrap_or(0.0);
        metrics.system.compute = (statistics.cpu_percent / 100.0).clamp(0.0, 1.0);
        metrics.system.memory = memory_fraction(&statistics);
        metrics.active_connections = statistics.active_connections;
        metrics.validate()?;

        *self.latest_metrics.lock().expect("metrics lock poisoned") = Some(metrics);
        *self.last_refresh.lock().expect("refresh lock poisoned") = Some(now);
        tracing::debug!(depth, urgency = signals.urgency, state = %signals.state, "metrics refreshed");
        Ok(())
    }

    /// Adaptation-loop body: learner maintenance plus decision timeouts.
    fn adaptation_tick(&self, now: DateTime<Utc>) {
        let timeout = ChronoDuration::seconds(self.profile.behavior.decision_timeout_s as i64);
        let expired = self
            .tracker
            .lock()
            .expect("tracker lock poisoned")
            .expire(now, timeout);
        for decision in expired {
            Counters::bump(&self.counters.timed_out);
            let was_offload = decision.target().is_some();
            let synthetic = ProcessOutcome::timed_out(
                decision.id().clone(),
                self.profile.behavior.decision_timeout_s,
            );
            if let Err(e) = self
                .adaptive
                .write()
                .expect("adaptive lock poisoned")
                .apply_outcome(&decision.context, &synthetic, now)
            {
                tracing::warn!(error = %e, "timeout learning update failed");
            }
            if was_offload {
                self.semaphore.release();
            }
            let _ = self.client.fail_process(
                &decision.context.process.id.0,
                &[format!("decision {} timed out", decision.id())],
            );
            self.audit.lock().expect("audit lock poisoned").append(
                AuditEventType::Outcome,
                Some(decision.id().clone()),
                vec![],
                "decision timed out",
                None,
            );
            tracing::warn!(decision_id = %decision.id(), "decision timed out");
        }

        self.adaptive
            .write()
            .expect("adaptive lock poisoned")
            .adaptation_tick(now);
    }

    /// Outcome fan-in: resolve the decision, learn once, report back.
    fn handle_outcome(
        &self,
        outcome: ProcessOutcome,
        now: DateTime<Utc>,
    ) -> Result<OutcomeDisposition> {
        if let Err(e) = outcome.validate() {
            Counters::bump(&self.counters.outcomes_dropped);
            return Err(e);
        }
        let ingest = self
            .tracker
            .lock()
            .expect("tracker lock poisoned")
            .take(&outcome.decision_id);
        match ingest {
            OutcomeIngest::Applied(mut decision) => {
                let was_offload = decision.target().is_some();
                let terminal = if outcome.success {
                    DecisionState::Completed
                } else {
                    DecisionState::Failed
                };
                decision.transition(terminal, now)?;

                let reward = self
                    .adaptive
                    .write()
                    .expect("adaptive lock poisoned")
                    .apply_outcome(&decision.context, &outcome, now)?;

                if was_offload {
                    self.semaphore.release();
                }
                if outcome.success {
                    Counters::bump(&self.counters.completed);
                    let _ = self.client.close_process(
                        &decision.context.process.id.0,
                        &serde_json::json!({
                            "decision_id": decision.id().to_string(),
                            "latency_ms": outcome.latency_ms,
                            "cost_usd": outcome.cost_usd,
                        }),
                    );
                } else {
                    Counters::bump(&self.counters.failed);
                    let _ = self.client.fail_process(
                        &decision.context.process.id.0,
                        &[format!("decision {} failed", decision.id())],
                    );
                }
                self.audit.lock().expect("audit lock poisoned").append(
                    AuditEventType::Outcome,
                    Some(outcome.decision_id.clone()),
                    vec![],
                    format!("{} reward {:.3}", terminal, reward),
                    None,
                );
                Ok(OutcomeDisposition::Applied { reward })
            }
            OutcomeIngest::Duplicate => {
                Counters::bump(&self.counters.duplicates_ignored);
                Ok(OutcomeDisposition::Duplicate)
            }
            OutcomeIngest::Unknown => {
                Counters::bump(&self.counters.outcomes_dropped);
                tracing::warn!(decision_id = %outcome.decision_id, "outcome for unknown decision dropped");
                self.audit.lock().expect("audit lock poisoned").append(
                    AuditEventType::Error,
                    Some(outcome.decision_id.clone()),
                    vec![],
                    "outcome for unknown decision dropped",
                    None,
                );
                Ok(OutcomeDisposition::Unknown)
            }
        }
    }

    fn stats(&self, now: DateTime<Utc>) -> OrchestratorStats {
        let uptime_secs = self
            .started_at
            .lock()
            .expect("started_at lock poisoned")
            .map(|at| now.signed_duration_since(at).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);
        let queue = self
            .analyzer
            .lock()
            .expect("analyzer lock poisoned")
            .signals();
        let outcomes_applied = self
            .adaptive
            .read()
            .expect("adaptive lock poisoned")
            .outcomes_applied();
        let c = &self.counters;
        OrchestratorStats {
            run_id: self.run_id,
            uptime_secs,
            in_flight: self.semaphore.in_use(),
            queue,
            dispatched: c.dispatched.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            timed_out: c.timed_out.load(Ordering::Relaxed),
            local_forced: c.local_forced.load(Ordering::Relaxed),
            policy_blocked: c.policy_blocked.load(Ordering::Relaxed),
            safety_blocked: c.safety_blocked.load(Ordering::Relaxed),
            outcomes_dropped: c.outcomes_dropped.load(Ordering::Relaxed),
            duplicates_ignored: c.duplicates_ignored.load(Ordering::Relaxed),
            backpressure_skips: c.backpressure_skips.load(Ordering::Relaxed),
            transient_errors: c.transient_errors.load(Ordering::Relaxed),
            invalid_inputs: c.invalid_inputs.load(Ordering::Relaxed),
            outcomes_applied,
        }
    }

    fn health(&self, now: DateTime<Utc>) -> HealthReport {
        let adaptive = self.adaptive.read().expect("adaptive lock poisoned");
        let weights_healthy = adaptive.weights.is_healthy();
        let bandit_healthy = adaptive.bandit.is_healthy();
        let metrics_age_secs = self
            .last_refresh
            .lock()
            .expect("refresh lock poisoned")
            .map(|at| now.signed_duration_since(at).num_seconds());
        HealthReport {
            healthy: weights_healthy && bandit_healthy,
            weights_healthy,
            weight_sum: adaptive.weights.weights().sum(),
            weights_converged: adaptive.weights.is_converged(),
            bandit_healthy,
            metrics_age_secs,
        }
    }
}

fn memory_fraction(statistics: &crate::colony::ColonyStatistics) -> f64 {
    match statistics.capacity.get("memory_bytes") {
        Some(capacity) if capacity.total > 0 => {
            (capacity.allocated as f64 / capacity.total as f64).clamp(0.0, 1.0)
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use cpo_common::{
        Capabilities, Conditions, CostCoefficients, DataLocation, DataRequirements, ExecutorId,
        ExecutorState, ExecutorType, GeoLocation, HardwareSpec, ProcessId, ProcessState,
        ResourceHints, SoftwareSpec, Utilization, Zone,
    };
    use cpo_config::DeploymentType;

    use crate::colony::types::{
        ColonyConditions, ColonyDataSpec, ColonyHints, ColonyProcess, ColonyProcessSpec,
        ColonyStatistics,
    };

    struct FakeColony {
        queue: Mutex<VecDeque<ColonyProcess>>,
        executors: Mutex<Vec<ColonyExecutor>>,
        statistics: Mutex<ColonyStatistics>,
        closed: Mutex<Vec<String>>,
        failed: Mutex<Vec<String>>,
        registered: Mutex<Vec<String>>,
    }

    impl FakeColony {
        fn new() -> Self {
            Self {
                queue: Mutex::new(VecDeque::new()),
                executors: Mutex::new(Vec::new()),
                statistics: Mutex::new(base_statistics(Utc::now())),
                closed: Mutex::new(Vec::new()),
                failed: Mutex::new(Vec::new()),
                registered: Mutex::new(Vec::new()),
            }
        }

        fn push_process(&self, process: ColonyProcess) {
            self.queue.lock().unwrap().push_back(process);
        }

        fn add_executor(&self, executor: &Executor) {
            self.executors
                .lock()
                .unwrap()
                .push(ColonyExecutor::from(executor));
        }
    }

    impl ColonyClient for FakeColony {
        fn register_executor(&self, executor: &ColonyExecutor) -> Result<()> {
            self.registered
                .lock()
                .unwrap()
                .push(executor.executor_id.clone());
            Ok(())
        }

        fn unregister_executor(&self, executor_id: &str) -> Result<()> {
            self.registered
                .lock()
                .unwrap()
                .retain(|id| id != executor_id);
            Ok(())
        }

        fn add_function(&self, _executor_id: &str, _func_name: &str) -> Result<()> {
            Ok(())
        }

        fn assign_process(&self, _timeout: Duration) -> Result<Option<ColonyProcess>> {
            Ok(self.queue.lock().unwrap().pop_front())
        }

        fn close_process(&self, process_id: &str, _result: &serde_json::Value) -> Result<()> {
            self.closed.lock().unwrap().push(process_id.to_string());
            Ok(())
        }

        fn fail_process(&self, process_id: &str, _errors: &[String]) -> Result<()> {
            self.failed.lock().unwrap().push(process_id.to_string());
            Ok(())
        }

        fn add_log(&self, _process_id: &str, _message: &str) -> Result<()> {
            Ok(())
        }

        fn get_executors(&self) -> Result<Vec<ColonyExecutor>> {
            Ok(self.executors.lock().unwrap().clone())
        }

        fn get_statistics(&self) -> Result<ColonyStatistics> {
            Ok(self.statistics.lock().unwrap().clone())
        }
    }

    fn base_statistics(generated_at: DateTime<Utc>) -> ColonyStatistics {
        ColonyStatistics {
            generated_at,
            waiting_processes: 3,
            running_processes: 1,
            successful_processes: 10,
            failed_processes: 0,
            cpu_percent: 20.0,
            memory_bytes: 4 << 30,
            active_connections: 4,
            avg_queue_time_ms: 200.0,
            avg_execution_ms: 900.0,
            capacity: Default::default(),
            executors: vec![],
            recent_processes: vec![],
            trends_24h: vec![],
        }
    }

    fn executor(id: &str, executor_type: ExecutorType, security: u8) -> Executor {
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
            security_level: security,
            jurisdiction: None,
            network_latency_ms: 20.0,
        }
    }

    fn process(id: &str) -> Process {
        Process {
            id: ProcessId::from(id),
            func_name: "render_tiles".into(),
            args: vec![],
            kwargs: Default::default(),
            conditions: Conditions::default(),
            priority: 0,
            wait_deadline: None,
            exec_deadline: None,
            data: DataRequirements {
                input_size_gb: 2.0,
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

    fn wire_process(id: &str) -> ColonyProcess {
        ColonyProcess {
            process_id: id.to_string(),
            spec: ColonyProcessSpec {
                func_name: "render_tiles".into(),
                args: vec![],
                kwargs: Default::default(),
                conditions: ColonyConditions {
                    executor_type: None,
                    min_cpu_millicores: 0,
                    min_memory_bytes: 0,
                    gpu_required: false,
                    security_level: 0,
                    jurisdictions: vec![],
                },
                priority: 0,
                max_wait_time_s: None,
                max_exec_time_s: None,
                data: ColonyDataSpec {
                    input_size_gb: 2.0,
                    input_location: "cloud".into(),
                    input_region: None,
                    output_location: None,
                    output_region: None,
                    sensitive: false,
                },
                hints: ColonyHints::default(),
                safety_critical: false,
                locality_required: false,
            },
            state: 0,
            submission_time: Utc::now(),
            start_time: None,
            end_time: None,
        }
    }

    fn metrics(now: DateTime<Utc>) -> MetricsVector {
        MetricsVector::at(now, 4, 20, DataLocation::new(Zone::Cloud), 2.0)
    }

    fn orchestrator(colony: Arc<FakeColony>) -> Orchestrator {
        let profile = DeploymentProfile::preset(DeploymentType::Hybrid);
        Orchestrator::new(profile, colony, executor("local-0", ExecutorType::Local, 5)).unwrap()
    }

    #[test]
    fn invalid_profile_fails_boot() {
        let mut profile = DeploymentProfile::preset(DeploymentType::Edge);
        profile.behavior.max_concurrent_processes = 0;
        let err = Orchestrator::new(
            profile,
            Arc::new(FakeColony::new()),
            executor("local-0", ExecutorType::Local, 5),
        )
        .unwrap_err();
        assert_eq!(err.code(), 10);
    }

    #[test]
    fn safety_critical_process_lands_on_the_local_executor() {
        let orch = orchestrator(Arc::new(FakeColony::new()));
        let now = Utc::now();
        let mut p = process("p1");
        p.safety_critical = true;
        p.conditions.security_level = 2;
        let candidates = vec![
            executor("e-local", ExecutorType::Local, 5),
            executor("e-cloud", ExecutorType::Cloud, 5),
        ];
        let decision = orch.place(p, metrics(now), &candidates, now).unwrap();
        assert_eq!(decision.state, DecisionState::Dispatched);
        assert_eq!(decision.target().unwrap().id.0, "e-local");
        assert_eq!(
            decision.reason.as_deref(),
            Some("safety-critical must execute locally")
        );
    }

    #[test]
    fn security_floor_picks_the_stronger_executor() {
        let orch = orchestrator(Arc::new(FakeColony::new()));
        let now = Utc::now();
        let mut p = process("p2");
        p.conditions.security_level = 4;
        let candidates = vec![
            executor("e-a", ExecutorType::Cloud, 2),
            executor("e-b", ExecutorType::Cloud, 5),
        ];
        let decision = orch.place(p, metrics(now), &candidates, now).unwrap();
        assert_eq!(decision.target().unwrap().id.0, "e-b");
    }

    #[test]
    fn stale_executors_are_not_candidates() {
        let orch = orchestrator(Arc::new(FakeColony::new()));
        let now = Utc::now();
        let mut stale = executor("e-stale", ExecutorType::Cloud, 5);
        stale.last_seen = now - ChronoDuration::seconds(120);
        let decision = orch.place(process("p3"), metrics(now), &[stale], now).unwrap();
        assert_eq!(decision.state, DecisionState::LocalForced);
        assert_eq!(decision.forced_cause, Some(ForcedCause::NoCandidates));
    }

    #[test]
    fn policy_block_names_the_rule_in_the_reason() {
        let orch = orchestrator(Arc::new(FakeColony::new()));
        let now = Utc::now();
        let mut p = process("p4");
        p.conditions.security_level = 9;
        let decision = orch
            .place(p, metrics(now), &[executor("e-weak", ExecutorType::Cloud, 3)], now)
            .unwrap();
        assert_eq!(decision.state, DecisionState::LocalForced);
        assert_eq!(decision.forced_cause, Some(ForcedCause::PolicyBlocked));
        assert!(decision
            .reason
            .as_deref()
            .unwrap()
            .contains("security level"));
    }

    #[test]
    fn safety_gate_forces_local_before_filtering() {
        let orch = orchestrator(Arc::new(FakeColony::new()));
        let now = Utc::now();
        let mut m = metrics(now);
        m.system.compute = 0.99;
        let decision = orch
            .place(process("p5"), m, &[executor("e", ExecutorType::Cloud, 5)], now)
            .unwrap();
        assert_eq!(decision.state, DecisionState::LocalForced);
        assert_eq!(decision.forced_cause, Some(ForcedCause::SafetyGate));
        assert!(decision.reason.as_deref().unwrap().starts_with("safety constraints"));
    }

    #[test]
    fn invalid_snapshot_rejects_the_placement() {
        let orch = orchestrator(Arc::new(FakeColony::new()));
        let now = Utc::now();
        let mut m = metrics(now);
        m.system.memory = -0.5;
        assert!(orch
            .place(process("p6"), m, &[executor("e", ExecutorType::Cloud, 5)], now)
            .is_err());
    }

    #[test]
    fn assignment_tick_dispatches_and_outcome_completes() {
        let colony = Arc::new(FakeColony::new());
        colony.add_executor(&executor("e-cloud", ExecutorType::Cloud, 5));
        colony.push_process(wire_process("proc-1"));
        let orch = orchestrator(colony.clone());

        let now = Utc::now();
        orch.run_metrics_tick(now).unwrap();
        let id = orch.run_assignment_tick(now).unwrap().expect("a decision");

        let stats = orch.stats();
        assert_eq!(stats.dispatched, 1);
        assert_eq!(stats.in_flight, 1);

        let outcome = ProcessOutcome {
            decision_id: id.clone(),
            success: true,
            latency_ms: 120.0,
            cost_usd: 0.02,
            throughput: 5.0,
            energy_wh: 2.0,
            data_transfer_gb: 0.4,
            met_sla: true,
            under_budget: true,
            attribution: None,
        };
        match orch.submit_outcome(outcome.clone()).unwrap() {
            OutcomeDisposition::Applied { reward } => assert!(reward > 0.0),
            other => panic!("expected applied, got {:?}", other),
        }

        let stats = orch.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.outcomes_applied, 1);
        assert_eq!(colony.closed.lock().unwrap().as_slice(), ["proc-1"]);

        // Replaying the same outcome is a no-op.
        assert!(matches!(
            orch.submit_outcome(outcome).unwrap(),
            OutcomeDisposition::Duplicate
        ));
        assert_eq!(orch.stats().outcomes_applied, 1);
    }

    #[test]
    fn unknown_outcome_is_dropped_with_a_metric() {
        let orch = orchestrator(Arc::new(FakeColony::new()));
        let outcome = ProcessOutcome::timed_out(DecisionId::new(), 10);
        assert!(matches!(
            orch.submit_outcome(outcome).unwrap(),
            OutcomeDisposition::Unknown
        ));
        assert_eq!(orch.stats().outcomes_dropped, 1);
    }

    #[test]
    fn saturated_semaphore_skips_the_tick() {
        let colony = Arc::new(FakeColony::new());
        colony.add_executor(&executor("e-cloud", ExecutorType::Cloud, 5));
        let mut profile = DeploymentProfile::preset(DeploymentType::Hybrid);
        profile.behavior.max_concurrent_processes = 1;
        let orch = Orchestrator::new(
            profile,
            colony.clone(),
            executor("local-0", ExecutorType::Local, 5),
        )
        .unwrap();

        let now = Utc::now();
        orch.run_metrics_tick(now).unwrap();
        colony.push_process(wire_process("proc-1"));
        colony.push_process(wire_process("proc-2"));
        assert!(orch.run_assignment_tick(now).unwrap().is_some());
        // The single permit is held by proc-1's dispatch.
        assert!(orch.run_assignment_tick(now).unwrap().is_none());
        assert_eq!(orch.stats().backpressure_skips, 1);
        // proc-2 is still queued in the colony, implicitly deferred.
        assert_eq!(colony.queue.lock().unwrap().len(), 1);
    }

    #[test]
    fn timed_out_decisions_release_their_permit_and_learn() {
        let colony = Arc::new(FakeColony::new());
        colony.add_executor(&executor("e-cloud", ExecutorType::Cloud, 5));
        let mut profile = DeploymentProfile::preset(DeploymentType::Hybrid);
        profile.behavior.decision_timeout_s = 60;
        let orch = Orchestrator::new(
            profile,
            colony.clone(),
            executor("local-0", ExecutorType::Local, 5),
        )
        .unwrap();

        let start = Utc::now();
        orch.run_metrics_tick(start).unwrap();
        colony.push_process(wire_process("proc-1"));
        orch.run_assignment_tick(start).unwrap().expect("dispatch");
        assert_eq!(orch.stats().in_flight, 1);

        orch.run_adaptation_tick(start + ChronoDuration::seconds(120));
        let stats = orch.stats();
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.outcomes_applied, 1);
        assert_eq!(colony.failed.lock().unwrap().as_slice(), ["proc-1"]);
    }

    #[test]
    fn stale_statistics_fail_the_metrics_tick() {
        let colony = Arc::new(FakeColony::new());
        let now = Utc::now();
        *colony.statistics.lock().unwrap() = base_statistics(now - ChronoDuration::seconds(7200));
        let orch = orchestrator(colony);
        let err = orch.run_metrics_tick(now).unwrap_err();
        assert_eq!(err.code(), 22);
    }

    #[test]
    fn start_registers_and_stop_unregisters() {
        let colony = Arc::new(FakeColony::new());
        let mut orch = orchestrator(colony.clone());
        orch.start().unwrap();
        assert_eq!(colony.registered.lock().unwrap().len(), 1);
        // Rule edits are rejected while running.
        {
            let mut policy = orch.shared.policy.write().unwrap();
            assert!(policy.set_rule_enabled("security-floor", false).is_err());
        }
        orch.stop();
        assert!(colony.registered.lock().unwrap().is_empty());
        let entries = orch.audit_entries();
        assert!(entries
            .iter()
            .any(|e| e.message == "orchestrator started"));
        assert!(entries
            .iter()
            .any(|e| e.message == "orchestrator stopped"));
    }

    #[test]
    fn health_reflects_learner_state() {
        let orch = orchestrator(Arc::new(FakeColony::new()));
        let health = orch.health();
        assert!(health.healthy);
        assert!(health.weights_healthy);
        assert!((health.weight_sum - 1.0).abs() <= 0.01);
        assert!(!health.weights_converged);
        assert!(health.metrics_age_secs.is_none());
    }
}

