//! Discovered (context → good action) placement rules.
//!
//! A pattern is born when a rare context produces a strongly positive
//! outcome. It stays tentative until it has earned enough support with a
//! high enough success rate, at which point it is promoted and starts
//! contributing a bounded score bonus. Patterns whose success rate decays
//! are demoted and pruned on the next scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use cpo_common::Zone;

use super::value::{LoadBucket, PlacementAction, SizeBucket};
use crate::metrics::MetricsVector;

/// Support needed before a tentative pattern can be promoted.
const PROMOTE_SUPPORT: u32 = 5;
/// Success rate needed for promotion.
const PROMOTE_RATE: f64 = 0.7;
/// Success rate under which a pattern is demoted.
const REFUTE_RATE: f64 = 0.4;
/// Observations needed before demotion is meaningful.
const REFUTE_MIN_SUPPORT: u32 = 3;
/// Reward at or above which an outcome counts as a pattern success.
const HIGH_REWARD: f64 = 0.6;
/// Novelty score at or above which a context counts as rare.
const NOVELTY_THRESHOLD: f64 = 0.8;
/// Ring of recent contexts backing the novelty score.
const RECENT_CONTEXTS: usize = 64;
/// Cap on stored patterns.
const MAX_PATTERNS: usize = 256;
/// Maximum score bonus a validated pattern may contribute.
pub const MAX_PATTERN_BONUS: f64 = 0.15;

/// Validation lifecycle of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStatus {
    Tentative,
    Validated,
    Refuted,
}

/// The discretized context a pattern matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextSignature {
    pub data_zone: Zone,
    pub size: SizeBucket,
    pub load: LoadBucket,
}

impl ContextSignature {
    pub fn from_metrics(metrics: &MetricsVector) -> Self {
        Self {
            data_zone: metrics.data_location.zone,
            size: SizeBucket::from_gb(metrics.pending_data_gb),
            load: LoadBucket::from_fraction(metrics.system.compute.max(metrics.system.memory)),
        }
    }
}

/// A learned (context → action) rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub context: ContextSignature,
    pub action: PlacementAction,
    pub status: PatternStatus,
    pub support: u32,
    pub successes: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pattern {
    pub fn success_rate(&self) -> f64 {
        if self.support == 0 {
            return 0.0;
        }
        self.successes as f64 / self.support as f64
    }
}

/// Bounded store of discovered patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternStore {
    patterns: Vec<Pattern>,
    recent_contexts: VecDeque<ContextSignature>,
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternStore {
    pub fn new() -> Self {
        Self {
            patterns: Vec::new(),
            recent_contexts: VecDeque::with_capacity(RECENT_CONTEXTS),
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn validated_count(&self) -> usize {
        self.patterns
            .iter()
            .filter(|p| p.status == PatternStatus::Validated)
            .count()
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// How unusual `context` is against the recent window: 1.0 = never
    /// seen, 0.0 = every recent decision looked like this.
    pub fn novelty(&self, context: &ContextSignature) -> f64 {
        if self.recent_contexts.is_empty() {
            return 1.0;
        }
        let seen = self
            .recent_contexts
            .iter()
            .filter(|c| *c == context)
            .count();
        1.0 - seen as f64 / self.recent_contexts.len() as f64
    }

    /// Feed one decision-time context and its outcome reward.
    ///
    /// Existing patterns for the pair accumulate support; a rare context
    /// with a strongly positive outcome seeds a new tentative pattern.
    pub fn observe(
        &mut self,
        context: ContextSignature,
        action: PlacementAction,
        reward: f64,
        now: DateTime<Utc>,
    ) {
        let novelty = self.novelty(&context);
        if self.recent_contexts.len() >= RECENT_CONTEXTS {
            self.recent_contexts.pop_front();
        }
        self.recent_contexts.push_back(context);

        if let Some(pattern) = self
            .patterns
            .iter_mut()
            .find(|p| p.context == context && p.action == action)
        {
            pattern.support += 1;
            if reward >= HIGH_REWARD {
                pattern.successes += 1;
            }
            pattern.updated_at = now;
            return;
        }

        if novelty >= NOVELTY_THRESHOLD && reward >= HIGH_REWARD && self.patterns.len() < MAX_PATTERNS
        {
            self.patterns.push(Pattern {
                context,
                action,
                status: PatternStatus::Tentative,
                support: 1,
                successes: 1,
                created_at: now,
                updated_at: now,
            });
        }
    }

    /// Periodic validation pass: promote earners, demote decliners, prune
    /// the previously refuted.
    pub fn scan(&mut self, now: DateTime<Utc>) {
        self.patterns.retain(|p| p.status != PatternStatus::Refuted);
        for pattern in &mut self.patterns {
            let rate = pattern.success_rate();
            match pattern.status {
                PatternStatus::Tentative => {
                    if pattern.support >= PROMOTE_SUPPORT && rate >= PROMOTE_RATE {
                        pattern.status = PatternStatus::Validated;
                        pattern.updated_at = now;
                    } else if pattern.support >= REFUTE_MIN_SUPPORT && rate < REFUTE_RATE {
                        pattern.status = PatternStatus::Refuted;
                        pattern.updated_at = now;
                    }
                }
                PatternStatus::Validated => {
                    if rate < REFUTE_RATE {
                        pattern.status = PatternStatus::Refuted;
                        pattern.updated_at = now;
                    }
                }
                PatternStatus::Refuted => {}
            }
        }
    }

    /// Bonus for a matching validated pattern, in [0, 0.15]. Tentative
    /// and refuted patterns contribute nothing.
    pub fn bonus(&self, context: &ContextSignature, action: PlacementAction) -> f64 {
        self.patterns
            .iter()
            .find(|p| {
                p.status == PatternStatus::Validated && p.context == *context && p.action == action
            })
            .map(|p| ((p.success_rate() - 0.5) * 0.3).clamp(0.0, MAX_PATTERN_BONUS))
            .unwrap_or(0.0)
    }
}
