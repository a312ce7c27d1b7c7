//! Long-horizon action-value learning over a discretized state space.
//!
//! States are coarse buckets of (data location, pending size, DAG stage,
//! system load); actions are the five placement moves. The table is
//! capped and evicted least-recently-updated first, so the learner's
//! memory stays bounded no matter how varied the workload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use cpo_common::Zone;

use crate::metrics::MetricsVector;

/// Default cap on table entries.
pub const DEFAULT_TABLE_CAPACITY: usize = 4096;
/// Learning rate for value updates.
const VALUE_ALPHA: f64 = 0.1;
/// Scorer-facing bonus bound.
const BONUS_BOUND: f64 = 0.1;

/// A placement move relative to the local queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementAction {
    Stay,
    ToEdge,
    ToCloud,
    ToHpc,
    ToFog,
}

impl PlacementAction {
    pub const ALL: [PlacementAction; 5] = [
        PlacementAction::Stay,
        PlacementAction::ToEdge,
        PlacementAction::ToCloud,
        PlacementAction::ToHpc,
        PlacementAction::ToFog,
    ];

    /// The action that places work in `zone`.
    pub fn for_zone(zone: Zone) -> Self {
        match zone {
            Zone::Local => PlacementAction::Stay,
            Zone::Edge => PlacementAction::ToEdge,
            Zone::Cloud => PlacementAction::ToCloud,
            Zone::Hpc => PlacementAction::ToHpc,
            Zone::Fog => PlacementAction::ToFog,
        }
    }
}

/// Pending input size bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeBucket {
    /// < 1 GB
    Small,
    /// < 10 GB
    Medium,
    /// < 100 GB
    Large,
    /// >= 100 GB
    Huge,
}

impl SizeBucket {
    pub fn from_gb(size_gb: f64) -> Self {
        if size_gb < 1.0 {
            SizeBucket::Small
        } else if size_gb < 10.0 {
            SizeBucket::Medium
        } else if size_gb < 100.0 {
            SizeBucket::Large
        } else {
            SizeBucket::Huge
        }
    }
}

/// Position within a DAG pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageBucket {
    Early,
    Middle,
    Late,
}

impl StageBucket {
    pub fn from_stage(current: u32, total: u32) -> Self {
        if total == 0 {
            return StageBucket::Early;
        }
        let ratio = current as f64 / total as f64;
        if ratio < 1.0 / 3.0 {
            StageBucket::Early
        } else if ratio < 2.0 / 3.0 {
            StageBucket::Middle
        } else {
            StageBucket::Late
        }
    }
}

/// Coarse system load bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBucket {
    Low,
    Mid,
    High,
}

impl LoadBucket {
    pub fn from_fraction(load: f64) -> Self {
        if load < 0.33 {
            LoadBucket::Low
        } else if load < 0.66 {
            LoadBucket::Mid
        } else {
            LoadBucket::High
        }
    }
}

/// One discretized state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateBucket {
    pub data_zone: Zone,
    pub size: SizeBucket,
    pub stage: StageBucket,
    pub load: LoadBucket,
}

impl StateBucket {
    /// Discretize a metrics snapshot.
    pub fn from_metrics(metrics: &MetricsVector) -> Self {
        let stage = match &metrics.dag {
            Some(dag) => StageBucket::from_stage(dag.current_stage, dag.total_stages),
            None => StageBucket::Early,
        };
        Self {
            data_zone: metrics.data_location.zone,
            size: SizeBucket::from_gb(metrics.pending_data_gb),
            stage,
            load: LoadBucket::from_fraction(metrics.system.compute.max(metrics.system.memory)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct ValueEntry {
    value: f64,
    updated_at: DateTime<Utc>,
    updates: u64,
}

/// Bounded action-value table.
///
/// Serialized as a row list; JSON maps cannot key on composite states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueLearner {
    #[serde(with = "table_rows")]
    table: HashMap<(StateBucket, PlacementAction), ValueEntry>,
    capacity: usize,
    /// Discount factor for the next-state estimate.
    gamma: f64,
    /// Optimism granted to untried actions, in [0, 1].
    exploration: f64,
    enabled: bool,
}

impl ValueLearner {
    pub fn new(enabled: bool, gamma: f64, exploration: f64, capacity: usize) -> Self {
        Self {
            table: HashMap::new(),
            capacity,
            gamma,
            exploration: exploration.clamp(0.0, 1.0),
            enabled,
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Current estimate for (state, action), zero if unseen.
    pub fn value(&self, state: StateBucket, action: PlacementAction) -> f64 {
        self.table
            .get(&(state, action))
            .map(|e| e.value)
            .unwrap_or(0.0)
    }

    /// Best estimate over all actions in `state`.
    pub fn best_value(&self, state: StateBucket) -> f64 {
        PlacementAction::ALL
            .iter()
            .map(|a| self.value(state, *a))
            .fold(0.0, f64::max)
    }

    /// Temporal-difference update toward `reward` plus the discounted
    /// best next-state estimate.
    pub fn update(
        &mut self,
        state: StateBucket,
        action: PlacementAction,
        reward: f64,
        next_state: StateBucket,
        now: DateTime<Utc>,
    ) {
        if !self.enabled {
            return;
        }
        let target = reward + self.gamma * self.best_value(next_state);
        let entry = self.table.entry((state, action)).or_insert(ValueEntry {
            value: 0.0,
            updated_at: now,
            updates: 0,
        });
        entry.value += VALUE_ALPHA * (target - entry.value);
        entry.updated_at = now;
        entry.updates += 1;

        if self.table.len() > self.capacity {
            self.evict_to_capacity();
        }
    }

    /// Scorer-facing bonus, bounded to ±0.1 so long-horizon estimates
    /// never overpower short-horizon gradients. Untried actions get an
    /// optimistic exploration bonus instead of zero.
    pub fn bonus(&self, state: StateBucket, action: PlacementAction) -> f64 {
        if !self.enabled {
            return 0.0;
        }
        match self.table.get(&(state, action)) {
            Some(entry) => (entry.value * BONUS_BOUND).clamp(-BONUS_BOUND, BONUS_BOUND),
            None => self.exploration * BONUS_BOUND,
        }
    }

    /// Evict least-recently-updated entries until within capacity.
    pub fn evict_to_capacity(&mut self) {
        while self.table.len() > self.capacity {
            let oldest = self
                .table
                .iter()
                .min_by_key(|(_, e)| e.updated_at)
                .map(|(k, _)| *k);
            match oldest {
                Some(key) => {
                    self.table.remove(&key);
                }
                None => break,
            }
        }
    }
}

mod table_rows {
    use super::{PlacementAction, StateBucket, ValueEntry};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;

    #[derive(Serialize, Deserialize)]
    struct Row {
        state: StateBucket,
        action: PlacementAction,
        value: f64,
        updated_at: DateTime<Utc>,
        updates: u64,
    }

    pub fn serialize<S: Serializer>(
        table: &HashMap<(StateBucket, PlacementAction), ValueEntry>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let rows: Vec<Row> = table
            .iter()
            .map(|((state, action), entry)| Row {
                state: *state,
                action: *action,
                value: entry.value,
                updated_at: entry.updated_at,
                updates: entry.updates,
            })
            .collect();
        rows.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<(StateBucket, PlacementAction), ValueEntry>, D::Error> {
        let rows = Vec::<Row>::deserialize(deserializer)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    (row.state, row.action),
                    ValueEntry {
                        value: row.value,
                        updated_at: row.updated_at,
                        updates: row.updates,
                    },
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use cpo_common::DataLocation;

    fn state(zone: Zone, size_gb: f64) -> StateBucket {
        StateBucket {
            data_zone: zone,
            size: SizeBucket::from_gb(size_gb),
            stage: StageBucket::Early,
            load: LoadBucket::Low,
        }
    }

    #[test]
    fn size_buckets_have_documented_boundaries() {
        assert_eq!(SizeBucket::from_gb(0.5), SizeBucket::Small);
        assert_eq!(SizeBucket::from_gb(1.0), SizeBucket::Medium);
        assert_eq!(SizeBucket::from_gb(10.0), SizeBucket::Large);
        assert_eq!(SizeBucket::from_gb(100.0), SizeBucket::Huge);
    }

    #[test]
    fn stage_buckets_split_in_thirds() {
        assert_eq!(StageBucket::from_stage(0, 6), StageBucket::Early);
        assert_eq!(StageBucket::from_stage(2, 6), StageBucket::Middle);
        assert_eq!(StageBucket::from_stage(5, 6), StageBucket::Late);
        assert_eq!(StageBucket::from_stage(0, 0), StageBucket::Early);
    }

    #[test]
    fn state_derives_from_metrics() {
        let mut m = MetricsVector::at(
            Utc::now(),
            3,
            20,
            DataLocation::new(Zone::Cloud),
            25.0,
        );
        m.system.compute = 0.7;
        let s = StateBucket::from_metrics(&m);
        assert_eq!(s.data_zone, Zone::Cloud);
        assert_eq!(s.size, SizeBucket::Large);
        assert_eq!(s.load, LoadBucket::High);
        assert_eq!(s.stage, StageBucket::Early);
    }

    #[test]
    fn update_moves_estimate_toward_reward() {
        let mut learner = ValueLearner::new(true, 0.9, 0.0, 64);
        let s = state(Zone::Edge, 0.5);
        let now = Utc::now();
        for _ in 0..50 {
            learner.update(s, PlacementAction::ToEdge, 1.0, s, now);
        }
        let v = learner.value(s, PlacementAction::ToEdge);
        // Fixed point of v = v + 0.1(1 + 0.9 v - v) is 10, approached slowly.
        assert!(v > 1.0);
        assert_eq!(learner.value(s, PlacementAction::ToCloud), 0.0);
    }

    #[test]
    fn disabled_learner_neither_updates_nor_bonuses() {
        let mut learner = ValueLearner::new(false, 0.9, 0.0, 64);
        let s = state(Zone::Cloud, 2.0);
        learner.update(s, PlacementAction::Stay, 5.0, s, Utc::now());
        assert!(learner.is_empty());
        assert_eq!(learner.bonus(s, PlacementAction::Stay), 0.0);
    }

    #[test]
    fn bonus_is_bounded() {
        let mut learner = ValueLearner::new(true, 0.9, 0.0, 64);
        let s = state(Zone::Hpc, 200.0);
        let now = Utc::now();
        for _ in 0..200 {
            learner.update(s, PlacementAction::ToHpc, 1.0, s, now);
        }
        let bonus = learner.bonus(s, PlacementAction::ToHpc);
        assert!(bonus <= BONUS_BOUND);
        for _ in 0..200 {
            learner.update(s, PlacementAction::ToFog, -1.0, s, now);
        }
        assert!(learner.bonus(s, PlacementAction::ToFog) >= -BONUS_BOUND);
    }

    #[test]
    fn untried_actions_earn_the_exploration_bonus() {
        let mut learner = ValueLearner::new(true, 0.9, 0.5, 64);
        let s = state(Zone::Cloud, 4.0);
        assert!((learner.bonus(s, PlacementAction::ToCloud) - 0.05).abs() < 1e-12);
        // Once tried, the learned estimate replaces the optimism.
        learner.update(s, PlacementAction::ToCloud, -1.0, s, Utc::now());
        assert!(learner.bonus(s, PlacementAction::ToCloud) < 0.0);
    }

    #[test]
    fn eviction_removes_least_recently_updated() {
        let mut learner = ValueLearner::new(true, 0.9, 0.0, 3);
        let base = Utc::now();
        let zones = [Zone::Local, Zone::Edge, Zone::Fog, Zone::Cloud];
        for (i, zone) in zones.iter().enumerate() {
            learner.update(
                state(*zone, 0.5),
                PlacementAction::Stay,
                0.5,
                state(*zone, 0.5),
                base + Duration::seconds(i as i64),
            );
        }
        assert_eq!(learner.len(), 3);
        // The first-touched entry (Local) was evicted.
        assert_eq!(learner.value(state(Zone::Local, 0.5), PlacementAction::Stay), 0.0);
        assert!(learner.value(state(Zone::Cloud, 0.5), PlacementAction::Stay) > 0.0);
    }

    #[test]
    fn table_serialization_round_trip() {
        let mut learner = ValueLearner::new(true, 0.9, 0.0, 16);
        let s = state(Zone::Edge, 3.0);
        learner.update(s, PlacementAction::ToEdge, 0.8, s, Utc::now());
        let json = serde_json::to_string(&learner).unwrap();
        let restored: ValueLearner = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.len(), 1);
        assert!(
            (restored.value(s, PlacementAction::ToEdge) - learner.value(s, PlacementAction::ToEdge))
                .abs()
                < 1e-12
        );
    }
}
