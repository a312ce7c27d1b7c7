//! Exponentially weighted moving averages.
//!
//! The smoother initializes directly to the first observation rather than
//! decaying up from zero, so early samples are not biased low.

use serde::{Deserialize, Serialize};

/// An EWMA smoother with fixed decay factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ewma {
    /// Decay factor in (0, 1]. Higher = more weight to recent values.
    alpha: f64,
    value: Option<f64>,
}

impl Ewma {
    /// Create a smoother with the given decay factor.
    pub fn new(alpha: f64) -> Self {
        Self { alpha, value: None }
    }

    /// Feed one observation and return the smoothed value.
    pub fn update(&mut self, x: f64) -> f64 {
        let next = match self.value {
            None => x,
            Some(prev) => self.alpha * x + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        next
    }

    /// Current smoothed value, or 0.0 before the first observation.
    pub fn value(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }

    /// Whether at least one observation has been fed.
    pub fn is_primed(&self) -> bool {
        self.value.is_some()
    }

    /// Reset to the unprimed state.
    pub fn reset(&mut self) {
        self.value = None;
    }
}
