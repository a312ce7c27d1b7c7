//! Decision records, the per-decision state machine, and the tracker
//! that links outcomes back to the decisions that caused them.
//!
//! ```text
//! PLANNED → FILTERED → SCORED → DISPATCHED → {COMPLETED | FAILED | TIMED_OUT}
//!     └────────┴──→ LOCAL_FORCED ──────────→ {COMPLETED | FAILED | TIMED_OUT}
//! ```
//!
//! Every terminal transition happens exactly once; the tracker remembers
//! recently finished ids so replayed outcome reports are no-ops.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

use cpo_common::{DecisionId, Error, Executor, Result};

use crate::adapt::DecisionContext;
use crate::scoring::ScoreBreakdown;

/// How many finished decision ids are remembered for idempotence.
const COMPLETED_MEMORY: usize = 1024;

/// Lifecycle of one placement decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionState {
    Planned,
    Filtered,
    Scored,
    Dispatched,
    /// The safety gate tripped or no candidate survived filtering.
    LocalForced,
    Completed,
    Failed,
    TimedOut,
}

impl DecisionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DecisionState::Completed | DecisionState::Failed | DecisionState::TimedOut
        )
    }

    /// Legal transitions of the decision state machine.
    pub fn can_transition(self, to: DecisionState) -> bool {
        use DecisionState::*;
        matches!(
            (self, to),
            (Planned, Filtered)
                | (Planned, LocalForced)
                | (Filtered, Scored)
                | (Filtered, LocalForced)
                | (Scored, Dispatched)
                | (Dispatched, Completed)
                | (Dispatched, Failed)
                | (Dispatched, TimedOut)
                | (LocalForced, Completed)
                | (LocalForced, Failed)
                | (LocalForced, TimedOut)
        )
    }
}

/// Why a decision was forced local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcedCause {
    /// The safety gate tripped before filtering.
    SafetyGate,
    /// Hard rules removed every candidate.
    PolicyBlocked,
    /// No live candidate existed to begin with.
    NoCandidates,
}

impl std::fmt::Display for DecisionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DecisionState::Planned => "planned",
            DecisionState::Filtered => "filtered",
            DecisionState::Scored => "scored",
            DecisionState::Dispatched => "dispatched",
            DecisionState::LocalForced => "local_forced",
            DecisionState::Completed => "completed",
            DecisionState::Failed => "failed",
            DecisionState::TimedOut => "timed_out",
        };
        write!(f, "{}", s)
    }
}

/// One placement decision and everything captured while making it.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub state: DecisionState,
    /// The `(process, executor, metrics)` triple handed to learners on
    /// completion.
    pub context: DecisionContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forced_cause: Option<ForcedCause>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Decision {
    pub fn new(context: DecisionContext, now: DateTime<Utc>) -> Self {
        Self {
            state: DecisionState::Planned,
            context,
            score: None,
            reason: None,
            forced_cause: None,
            created_at: now,
            dispatched_at: None,
            finished_at: None,
        }
    }

    pub fn id(&self) -> &DecisionId {
        &self.context.decision_id
    }

    /// The chosen target, if any.
    pub fn target(&self) -> Option<&Executor> {
        self.context.executor.as_ref()
    }

    /// Advance the state machine; illegal transitions are programmer
    /// errors surfaced as `InvalidInput`.
    pub fn transition(&mut self, to: DecisionState, now: DateTime<Utc>) -> Result<()> {
        if !self.state.can_transition(to) {
            return Err(Error::InvalidInput(format!(
                "illegal decision transition {} -> {} for {}",
                self.state,
                to,
                self.id()
            )));
        }
        self.state = to;
        match to {
            DecisionState::Dispatched | DecisionState::LocalForced => {
                self.dispatched_at = Some(now);
            }
            s if s.is_terminal() => {
                self.finished_at = Some(now);
            }
            _ => {}
        }
        Ok(())
    }

    /// Short-circuit to LOCAL_FORCED with a cause and reason.
    pub fn force_local(
        &mut self,
        cause: ForcedCause,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.reason = Some(reason.into());
        self.forced_cause = Some(cause);
        self.transition(DecisionState::LocalForced, now)
    }
}

/// Disposition of one incoming outcome report.
#[derive(Debug)]
pub enum OutcomeIngest {
    /// First report for a live decision; learn from it.
    Applied(Box<Decision>),
    /// The decision already finished; re-application is a no-op.
    Duplicate,
    /// No decision ever carried this id.
    Unknown,
}

/// In-flight decisions plus a bounded memory of finished ones.
#[derive(Debug, Default)]
pub struct DecisionTracker {
    in_flight: HashMap<DecisionId, Decision>,
    finished_order: VecDeque<DecisionId>,
    finished: HashSet<DecisionId>,
}

impl DecisionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Track a dispatched or local-forced decision until its outcome
    /// arrives.
    pub fn insert(&mut self, decision: Decision) -> Result<()> {
        let id = decision.id().clone();
        if self.in_flight.contains_key(&id) || self.finished.contains(&id) {
            return Err(Error::InvalidInput(format!(
                "decision id {} already tracked",
                id
            )));
        }
        self.in_flight.insert(id, decision);
        Ok(())
    }

    /// Resolve an outcome report to its decision.
    pub fn take(&mut self, id: &DecisionId) -> OutcomeIngest {
        match self.in_flight.remove(id) {
            Some(decision) => {
                self.remember_finished(id.clone());
                OutcomeIngest::Applied(Box::new(decision))
            }
            None if self.finished.contains(id) => OutcomeIngest::Duplicate,
            None => OutcomeIngest::Unknown,
        }
    }

    /// Pull every decision whose dispatch exceeded `timeout`, marked
    /// TIMED_OUT.
    pub fn expire(&mut self, now: DateTime<Utc>, timeout: Duration) -> Vec<Decision> {
        let expired_ids: Vec<DecisionId> = self
            .in_flight
            .iter()
            .filter(|(_, d)| match d.dispatched_at {
                Some(at) => now.signed_duration_since(at) > timeout,
                None => false,
            })
            .map(|(id, _)| id.clone())
            .collect();

        let mut expired = Vec::with_capacity(expired_ids.len());
        for id in expired_ids {
            if let Some(mut decision) = self.in_flight.remove(&id) {
                // Both dispatch states accept TimedOut.
                let _ = decision.transition(DecisionState::TimedOut, now);
                self.remember_finished(id);
                expired.push(decision);
            }
        }
        expired
    }

    fn remember_finished(&mut self, id: DecisionId) {
        if self.finished_order.len() >= COMPLETED_MEMORY {
            if let Some(evicted) = self.finished_order.pop_front() {
                self.finished.remove(&evicted);
            }
        }
        self.finished.insert(id.clone());
        self.finished_order.push_back(id);
    }
}
