//! Queue dynamics: smoothed velocity, acceleration, and urgency.
//!
//! Each depth sample feeds two EWMA chains (velocity then acceleration).
//! Samples closer than the minimum interval return the prior smoothed
//! values unchanged, which also makes replaying a sample a no-op. A
//! bounded ring of smoothed accelerations backs the sustained-growth
//! flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use cpo_math::Ewma;

/// Minimum spacing between samples; closer samples are ignored.
pub const MIN_SAMPLE_INTERVAL_SECS: f64 = 1.0;
/// EWMA decay for velocity smoothing.
const VELOCITY_ALPHA: f64 = 0.167;
/// EWMA decay for acceleration smoothing.
const ACCELERATION_ALPHA: f64 = 0.10;
/// Ring capacity for recent smoothed accelerations.
const ACCELERATION_RING: usize = 10;
/// Noise floor for sustained acceleration, items/s².
const ACCELERATION_NOISE_FLOOR: f64 = 0.1;
/// Urgency is capped here.
const URGENCY_CAP: f64 = 2.0;
/// Default CUSUM drift allowance, items/s.
const DEFAULT_CUSUM_DRIFT: f64 = 0.05;
/// Default CUSUM alarm threshold.
const DEFAULT_CUSUM_THRESHOLD: f64 = 2.0;

/// One-sided CUSUM detector over queue velocity.
///
/// Accumulates positive deviations of the raw velocity above its
/// smoothed mean; an accumulation past the threshold flags a regime
/// change and resets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct CusumDetector {
    drift: f64,
    threshold: f64,
    statistic: f64,
}

impl CusumDetector {
    fn new(drift: f64, threshold: f64) -> Self {
        Self {
            drift,
            threshold,
            statistic: 0.0,
        }
    }

    /// Feed one deviation; true when the alarm fires.
    fn update(&mut self, deviation: f64) -> bool {
        self.statistic = (self.statistic + deviation - self.drift).max(0.0);
        if self.statistic > self.threshold {
            self.statistic = 0.0;
            return true;
        }
        false
    }
}

/// Queue congestion classification by pressure (depth / threshold).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Empty,
    Light,
    Moderate,
    Heavy,
    Critical,
    Overflow,
}

impl QueueState {
    /// Classify by pressure; `depth` disambiguates the empty queue.
    pub fn classify(depth: usize, pressure: f64) -> Self {
        if depth == 0 {
            QueueState::Empty
        } else if pressure < 0.5 {
            QueueState::Light
        } else if pressure < 1.0 {
            QueueState::Moderate
        } else if pressure < 1.5 {
            QueueState::Heavy
        } else if pressure < 2.0 {
            QueueState::Critical
        } else {
            QueueState::Overflow
        }
    }
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueueState::Empty => "empty",
            QueueState::Light => "light",
            QueueState::Moderate => "moderate",
            QueueState::Heavy => "heavy",
            QueueState::Critical => "critical",
            QueueState::Overflow => "overflow",
        };
        write!(f, "{}", s)
    }
}

/// Smoothed queue signals produced by one analyzer update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueSignals {
    pub depth: usize,
    pub pressure: f64,
    /// Smoothed depth velocity, items/s.
    pub velocity: f64,
    /// Smoothed velocity change, items/s².
    pub acceleration: f64,
    pub sustained_acceleration: bool,
    /// A CUSUM alarm fired on this sample: velocity shifted regimes.
    pub regime_change: bool,
    /// Composite urgency in [0, 2].
    pub urgency: f64,
    pub state: QueueState,
}

impl QueueSignals {
    fn idle() -> Self {
        Self {
            depth: 0,
            pressure: 0.0,
            velocity: 0.0,
            acceleration: 0.0,
            sustained_acceleration: false,
            regime_change: false,
            urgency: 0.0,
            state: QueueState::Empty,
        }
    }
}

/// Per-tick queue depth analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueAnalyzer {
    threshold: usize,
    last_sample: Option<(usize, DateTime<Utc>)>,
    velocity: Ewma,
    acceleration: Ewma,
    accel_ring: VecDeque<f64>,
    cusum: CusumDetector,
    last_signals: QueueSignals,
}

impl QueueAnalyzer {
    pub fn new(threshold: usize) -> Self {
        Self::with_cusum(threshold, DEFAULT_CUSUM_DRIFT, DEFAULT_CUSUM_THRESHOLD)
    }

    /// Analyzer with explicit CUSUM tuning from the deployment profile.
    pub fn with_cusum(threshold: usize, cusum_drift: f64, cusum_threshold: f64) -> Self {
        Self {
            threshold,
            last_sample: None,
            velocity: Ewma::new(VELOCITY_ALPHA),
            acceleration: Ewma::new(ACCELERATION_ALPHA),
            accel_ring: VecDeque::with_capacity(ACCELERATION_RING),
            cusum: CusumDetector::new(cusum_drift, cusum_threshold),
            last_signals: QueueSignals::idle(),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Most recent signals without feeding a new sample.
    pub fn signals(&self) -> QueueSignals {
        self.last_signals
    }

    /// Feed one `(depth, now)` sample and return the smoothed signals.
    pub fn update(&mut self, depth: usize, now: DateTime<Utc>) -> QueueSignals {
        let pressure = if self.threshold == 0 {
            0.0
        } else {
            depth as f64 / self.threshold as f64
        };

        let (last_depth, last_at) = match self.last_sample {
            None => {
                // First sample primes the history; no rates yet.
                self.last_sample = Some((depth, now));
                self.last_signals = self.compose(depth, pressure, 0.0, 0.0, false);
                return self.last_signals;
            }
            Some(pair) => pair,
        };

        let dt = now.signed_duration_since(last_at).num_milliseconds() as f64 / 1000.0;
        if dt < MIN_SAMPLE_INTERVAL_SECS {
            // Too close to the previous sample; rates would blow up.
            return self.last_signals;
        }

        let velocity_was_primed = self.velocity.is_primed();
        let prev_velocity = self.velocity.value();
        let raw_velocity = (depth as f64 - last_depth as f64) / dt;
        let velocity = self.velocity.update(raw_velocity);

        // Acceleration and change detection need two velocity samples.
        let (acceleration, regime_change) = if velocity_was_primed {
            let raw_acceleration = (velocity - prev_velocity) / dt;
            let smoothed = self.acceleration.update(raw_acceleration);
            if self.accel_ring.len() >= ACCELERATION_RING {
                self.accel_ring.pop_front();
            }
            self.accel_ring.push_back(smoothed);
            let alarm = self.cusum.update(raw_velocity - prev_velocity);
            (smoothed, alarm)
        } else {
            (0.0, false)
        };

        self.last_sample = Some((depth, now));
        self.last_signals = self.compose(depth, pressure, velocity, acceleration, regime_change);
        self.last_signals
    }

    fn compose(
        &self,
        depth: usize,
        pressure: f64,
        velocity: f64,
        acceleration: f64,
        regime_change: bool,
    ) -> QueueSignals {
        let sustained = self.sustained_acceleration();
        let accel_gain = if sustained { 1.5 } else { 1.0 };
        let urgency = (pressure
            + 0.3 * velocity.max(0.0)
            + 0.1 * acceleration.max(0.0) * accel_gain)
            .min(URGENCY_CAP);
        QueueSignals {
            depth,
            pressure,
            velocity,
            acceleration,
            sustained_acceleration: sustained,
            regime_change,
            urgency,
            state: QueueState::classify(depth, pressure),
        }
    }

    /// Majority of the last three smoothed accelerations above the noise
    /// floor.
    fn sustained_acceleration(&self) -> bool {
        let window: Vec<f64> = self.accel_ring.iter().rev().take(3).copied().collect();
        if window.is_empty() {
            return false;
        }
        let above = window
            .iter()
            .filter(|a| **a > ACCELERATION_NOISE_FLOOR)
            .count();
        above * 2 > window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base() -> DateTime<Utc> {
        "2026-08-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn first_sample_has_no_rates() {
        let mut qa = QueueAnalyzer::new(20);
        let s = qa.update(5, base());
        assert_eq!(s.velocity, 0.0);
        assert_eq!(s.acceleration, 0.0);
        assert_eq!(s.pressure, 0.25);
        assert_eq!(s.state, QueueState::Light);
    }

    #[test]
    fn replaying_a_sample_is_a_no_op() {
        let mut qa = QueueAnalyzer::new(20);
        qa.update(5, base());
        let first = qa.update(8, base() + Duration::seconds(2));
        let replay = qa.update(8, base() + Duration::seconds(2));
        assert_eq!(first, replay);
        assert_eq!(qa.signals(), first);
    }

    #[test]
    fn sub_second_samples_are_ignored() {
        let mut qa = QueueAnalyzer::new(20);
        qa.update(5, base());
        let s1 = qa.update(6, base() + Duration::seconds(1));
        let s2 = qa.update(500, base() + Duration::milliseconds(1500));
        assert_eq!(s1, s2);
    }

    #[test]
    fn velocity_smooths_toward_raw_rate() {
        let mut qa = QueueAnalyzer::new(20);
        qa.update(0, base());
        let mut last = QueueSignals::idle();
        for i in 1..=10 {
            // +2 items per second.
            last = qa.update(i * 2, base() + Duration::seconds(i as i64));
        }
        assert!(last.velocity > 1.0);
        assert!(last.velocity <= 2.0);
    }

    #[test]
    fn accelerating_queue_sets_sustained_flag_and_raises_urgency() {
        // Depths 5, 6, 8, 11, 15 at 1s spacing against threshold 20.
        let mut qa = QueueAnalyzer::new(20);
        let depths = [5usize, 6, 8, 11, 15];
        let mut last = QueueSignals::idle();
        for (i, depth) in depths.iter().enumerate() {
            last = qa.update(*depth, base() + Duration::seconds(i as i64));
        }
        assert!(last.sustained_acceleration);
        assert!(last.urgency > last.pressure);
        assert!(last.acceleration > ACCELERATION_NOISE_FLOOR);
    }

    #[test]
    fn steady_queue_is_not_sustained() {
        let mut qa = QueueAnalyzer::new(20);
        for i in 0..8 {
            qa.update(10, base() + Duration::seconds(i));
        }
        let s = qa.signals();
        assert!(!s.sustained_acceleration);
        assert!(s.velocity.abs() < 1e-9);
    }

    #[test]
    fn pressure_boundaries_classify_exactly() {
        assert_eq!(QueueState::classify(20, 1.0), QueueState::Heavy);
        assert_eq!(QueueState::classify(40, 2.0), QueueState::Overflow);
        assert_eq!(QueueState::classify(0, 0.0), QueueState::Empty);
        assert_eq!(QueueState::classify(9, 0.45), QueueState::Light);
        assert_eq!(QueueState::classify(19, 0.95), QueueState::Moderate);
        assert_eq!(QueueState::classify(39, 1.95), QueueState::Critical);
    }

    #[test]
    fn urgency_is_capped() {
        let mut qa = QueueAnalyzer::new(4);
        qa.update(0, base());
        for i in 1..10 {
            qa.update(i * 40, base() + Duration::seconds(i as i64));
        }
        assert!(qa.signals().urgency <= URGENCY_CAP + 1e-12);
    }

    #[test]
    fn velocity_jump_trips_the_cusum_alarm() {
        let mut qa = QueueAnalyzer::with_cusum(50, 0.05, 2.0);
        // A flat stretch establishes the regime.
        for i in 0..5 {
            qa.update(10, base() + Duration::seconds(i));
        }
        assert!(!qa.signals().regime_change);
        // A sharp sustained ramp accumulates past the threshold.
        let mut fired = false;
        for i in 0..6 {
            let s = qa.update(10 + (i + 1) * 8, base() + Duration::seconds(5 + i as i64));
            fired |= s.regime_change;
        }
        assert!(fired);
    }

    #[test]
    fn slow_drift_stays_under_the_cusum_threshold() {
        let mut qa = QueueAnalyzer::with_cusum(50, 0.5, 5.0);
        for i in 0..20 {
            // +1 item every 4 seconds, well inside the drift allowance.
            let s = qa.update(10 + i / 4, base() + Duration::seconds(i as i64 * 4));
            assert!(!s.regime_change);
        }
    }

    #[test]
    fn analyzer_state_serialization_round_trip() {
        let mut qa = QueueAnalyzer::new(20);
        qa.update(5, base());
        qa.update(9, base() + Duration::seconds(1));
        let json = serde_json::to_string(&qa).unwrap();
        let restored: QueueAnalyzer = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.signals(), qa.signals());
    }
}
