//! Policy enforcement for placement decisions.
//!
//! The PolicyFilter sits between candidate discovery and scoring. Hard
//! rules remove targets outright; soft rules subtract a fixed penalty from
//! the target's score. A separate safety gate checks local headroom and
//! the offload ceiling before any per-target filtering happens.
//!
//! ```text
//! Candidates → SafetyGate → PolicyFilter → Scorer → Dispatch
//!                                ↑
//!                         rules (hard/soft)
//! ```
//!
//! The filter is locked while the orchestrator runs: rule edits are
//! rejected so a decision in flight never races a rule change. Every
//! evaluation lands in a bounded audit ring.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpo_common::{Error, Executor, Process, ProcessId, Result, Zone};
use cpo_config::SafetyFloors;

use crate::metrics::SystemUtilization;

/// Penalty subtracted per violated soft rule.
pub const DEFAULT_SOFT_PENALTY: f64 = 0.05;
/// Capacity of the evaluation audit ring.
const AUDIT_RING_CAPACITY: usize = 256;

/// Rule severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Violations remove the target from the candidate set.
    Hard,
    /// Violations subtract `penalty` from the target's score.
    Soft,
}

/// Predicate over a (process, executor) pair; `true` means satisfied.
pub type RulePredicate = Arc<dyn Fn(&Process, &Executor) -> bool + Send + Sync>;

/// One policy rule plus lifecycle metadata.
#[derive(Clone)]
pub struct PolicyRule {
    pub id: String,
    pub kind: RuleKind,
    pub priority: i32,
    pub description: String,
    pub enabled: bool,
    pub penalty: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    predicate: RulePredicate,
}

impl std::fmt::Debug for PolicyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRule")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl PolicyRule {
    /// A hard rule: violating targets are removed.
    pub fn hard(
        id: impl Into<String>,
        priority: i32,
        description: impl Into<String>,
        predicate: impl Fn(&Process, &Executor) -> bool + Send + Sync + 'static,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind: RuleKind::Hard,
            priority,
            description: description.into(),
            enabled: true,
            penalty: 0.0,
            created_at: now,
            updated_at: now,
            predicate: Arc::new(predicate),
        }
    }

    /// A soft rule: violating targets lose `penalty` from their score.
    pub fn soft(
        id: impl Into<String>,
        priority: i32,
        description: impl Into<String>,
        penalty: f64,
        predicate: impl Fn(&Process, &Executor) -> bool + Send + Sync + 'static,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind: RuleKind::Soft,
            priority,
            description: description.into(),
            enabled: true,
            penalty,
            created_at: now,
            updated_at: now,
            predicate: Arc::new(predicate),
        }
    }

    fn satisfied(&self, process: &Process, executor: &Executor) -> bool {
        (self.predicate)(process, executor)
    }
}

/// Soft-rule evaluation of one (process, executor) pair.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyVerdict {
    /// False when any enabled hard rule is violated.
    pub allowed: bool,
    /// Non-positive score adjustment from violated soft rules.
    pub score_adjustment: f64,
    /// Ids of every violated rule, hard and soft.
    pub violated_rules: Vec<String>,
}

/// One audit record appended per evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyEvaluation {
    pub ts: DateTime<Utc>,
    pub process_id: ProcessId,
    pub executor_id: String,
    pub allowed: bool,
    pub violated_rules: Vec<String>,
}

/// Hard/soft rule evaluation over candidate executors.
pub struct PolicyFilter {
    rules: Vec<PolicyRule>,
    locked: bool,
    evaluations: Mutex<VecDeque<PolicyEvaluation>>,
}

impl PolicyFilter {
    /// An empty filter with no rules.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            locked: false,
            evaluations: Mutex::new(VecDeque::with_capacity(AUDIT_RING_CAPACITY)),
        }
    }

    /// The default rule set.
    ///
    /// Hard: safety-critical stays local, target security floor, locality
    /// pinning, capability floor, pinned executor type, jurisdiction.
    /// Soft: prefer reliable targets, prefer cheap compute.
    pub fn with_default_rules() -> Self {
        let mut filter = Self::empty();

        filter.rules.push(PolicyRule::hard(
            "safety-critical-local",
            100,
            "safety-critical must execute locally",
            |p, e| !p.safety_critical || e.zone() == Zone::Local,
        ));
        filter.rules.push(PolicyRule::hard(
            "security-floor",
            90,
            "target security level must be at least the process's",
            |p, e| e.security_level >= p.conditions.security_level,
        ));
        filter.rules.push(PolicyRule::hard(
            "locality-local-or-edge",
            80,
            "locality-required restricts targets to local or edge",
            |p, e| !p.locality_required || matches!(e.zone(), Zone::Local | Zone::Edge),
        ));
        filter.rules.push(PolicyRule::hard(
            "capability-floor",
            70,
            "target hardware must meet the process's minimums",
            |p, e| {
                let hw = &e.capabilities.hardware;
                hw.cpu_millicores >= p.conditions.min_cpu_millicores
                    && hw.memory_bytes >= p.conditions.min_memory_bytes
                    && (!p.conditions.requires_gpu || hw.has_gpu())
            },
        ));
        filter.rules.push(PolicyRule::hard(
            "type-pinned",
            60,
            "process pinned to a specific executor type",
            |p, e| match p.conditions.executor_type {
                None => true,
                Some(required) => e.executor_type == required,
            },
        ));
        filter.rules.push(PolicyRule::hard(
            "jurisdiction-allowed",
            50,
            "sensitive data stays inside the declared jurisdictions",
            |p, e| {
                if p.conditions.jurisdictions.is_empty() {
                    return true;
                }
                match &e.jurisdiction {
                    Some(j) => p.conditions.jurisdictions.iter().any(|allowed| allowed == j),
                    None => false,
                }
            },
        ));

        filter.rules.push(PolicyRule::soft(
            "prefer-reliable",
            10,
            "prefer executors with reliability above 0.8",
            DEFAULT_SOFT_PENALTY,
            |_, e| e.reliability > 0.8,
        ));
        filter.rules.push(PolicyRule::soft(
            "prefer-cheap-compute",
            10,
            "prefer compute priced under $0.20/h",
            DEFAULT_SOFT_PENALTY,
            |_, e| e.cost.compute_per_hour < 0.20,
        ));

        filter
    }

    /// Lock rule edits while decisions are in flight.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Allow rule edits again after shutdown.
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Add a rule. Rejected while the filter is locked.
    pub fn add_rule(&mut self, rule: PolicyRule) -> Result<()> {
        if self.locked {
            return Err(Error::InvalidInput(
                "policy rules are immutable while the orchestrator runs".into(),
            ));
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Enable or disable a rule by id. Rejected while locked.
    pub fn set_rule_enabled(&mut self, id: &str, enabled: bool) -> Result<()> {
        if self.locked {
            return Err(Error::InvalidInput(
                "policy rules are immutable while the orchestrator runs".into(),
            ));
        }
        match self.rules.iter_mut().find(|r| r.id == id) {
            Some(rule) => {
                rule.enabled = enabled;
                rule.updated_at = Utc::now();
                Ok(())
            }
            None => Err(Error::InvalidInput(format!("no policy rule with id {id}"))),
        }
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Drop candidates that violate any enabled hard rule.
    pub fn filter(&self, process: &Process, candidates: &[Executor]) -> Vec<Executor> {
        candidates
            .iter()
            .filter(|e| {
                let violated = self.violated_hard_rules(process, e);
                let allowed = violated.is_empty();
                self.record(process, e, allowed, violated);
                allowed
            })
            .cloned()
            .collect()
    }

    /// Evaluate soft rules for one pair; `score_adjustment` is
    /// non-positive.
    pub fn evaluate(&self, process: &Process, executor: &Executor) -> PolicyVerdict {
        let mut violated = self.violated_hard_rules(process, executor);
        let allowed = violated.is_empty();
        let mut adjustment = 0.0;
        for rule in self.enabled_rules(RuleKind::Soft) {
            if !rule.satisfied(process, executor) {
                adjustment -= rule.penalty;
                violated.push(rule.id.clone());
            }
        }
        self.record(process, executor, allowed, violated.clone());
        PolicyVerdict {
            allowed,
            score_adjustment: adjustment,
            violated_rules: violated,
        }
    }

    /// Why a process has no viable targets: ids of hard rules violated by
    /// every candidate.
    pub fn blocking_rules(&self, process: &Process, candidates: &[Executor]) -> Vec<String> {
        let mut blocking: Vec<String> = Vec::new();
        for rule in self.enabled_rules(RuleKind::Hard) {
            if candidates.iter().all(|e| !rule.satisfied(process, e)) {
                blocking.push(rule.id.clone());
            }
        }
        blocking
    }

    /// Recent evaluations, oldest first.
    pub fn recent_evaluations(&self) -> Vec<PolicyEvaluation> {
        self.evaluations
            .lock()
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn enabled_rules(&self, kind: RuleKind) -> impl Iterator<Item = &PolicyRule> {
        self.rules
            .iter()
            .filter(move |r| r.enabled && r.kind == kind)
    }

    fn violated_hard_rules(&self, process: &Process, executor: &Executor) -> Vec<String> {
        self.enabled_rules(RuleKind::Hard)
            .filter(|r| !r.satisfied(process, executor))
            .map(|r| r.id.clone())
            .collect()
    }

    fn record(&self, process: &Process, executor: &Executor, allowed: bool, violated: Vec<String>) {
        if let Ok(mut ring) = self.evaluations.lock() {
            if ring.len() >= AUDIT_RING_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(PolicyEvaluation {
                ts: Utc::now(),
                process_id: process.id.clone(),
                executor_id: executor.id.0.clone(),
                allowed,
                violated_rules: violated,
            });
        }
    }
}

/// Pre-decision check of local headroom and the offload ceiling.
///
/// Evaluated before any per-target filtering; a tripped gate forces a
/// local-execution decision.
#[derive(Debug, Clone, Copy)]
pub struct SafetyGate {
    floors: SafetyFloors,
    max_concurrent: usize,
}

impl SafetyGate {
    pub fn new(floors: SafetyFloors, max_concurrent: usize) -> Self {
        Self {
            floors,
            max_concurrent,
        }
    }

    /// `Err(SafetyBlocked)` when offloading must be suspended.
    pub fn check(&self, system: &SystemUtilization, in_flight: usize) -> Result<()> {
        let compute_headroom = 1.0 - system.compute;
        if compute_headroom < self.floors.min_compute_headroom {
            return Err(Error::SafetyBlocked(format!(
                "local compute headroom {:.3} below floor {:.3}",
                compute_headroom, self.floors.min_compute_headroom
            )));
        }
        let memory_headroom = 1.0 - system.memory;
        if memory_headroom < self.floors.min_memory_headroom {
            return Err(Error::SafetyBlocked(format!(
                "local memory headroom {:.3} below floor {:.3}",
                memory_headroom, self.floors.min_memory_headroom
            )));
        }
        if in_flight >= self.max_concurrent {
            return Err(Error::SafetyBlocked(format!(
                "concurrent offloads at ceiling ({}/{})",
                in_flight, self.max_concurrent
            )));
        }
        Ok(())
    }
}
