//! Data gravity: turning inter-location transfers into cost and time.
//!
//! Transfer pricing follows the locality chain: moving data between
//! co-located endpoints is free, and the unit price grows as locality
//! decays. The gravity exponent applied by the scorer lives in the
//! deployment profile; this module only prices movement.

use serde::{Deserialize, Serialize};

use cpo_common::{locality_score, DataLocation};

/// Prices data movement between coarse locations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferCostModel {
    /// Worst-case unit price, $/GB, charged at locality 0.
    pub rate_per_gb: f64,
    /// Effective cross-location bandwidth, Gbit/s, at locality 1.
    pub bandwidth_gbps: f64,
}

impl Default for TransferCostModel {
    fn default() -> Self {
        Self {
            rate_per_gb: 0.09,
            bandwidth_gbps: 10.0,
        }
    }
}

impl TransferCostModel {
    /// Unit price in $/GB between two locations.
    ///
    /// Identical locations transfer for exactly zero.
    pub fn cost_per_gb(&self, from: &DataLocation, to: &DataLocation) -> f64 {
        if from == to {
            return 0.0;
        }
        let distance = 1.0 - locality_score(from, to);
        self.rate_per_gb * distance
    }

    /// Total transfer cost in dollars for `size_gb` of data.
    pub fn transfer_cost(&self, from: &DataLocation, to: &DataLocation, size_gb: f64) -> f64 {
        self.cost_per_gb(from, to) * size_gb.max(0.0)
    }

    /// Estimated transfer time in seconds; locality throttles effective
    /// bandwidth.
    pub fn transfer_time_secs(&self, from: &DataLocation, to: &DataLocation, size_gb: f64) -> f64 {
        if from == to || size_gb <= 0.0 {
            return 0.0;
        }
        let effective_gbps = self.bandwidth_gbps * locality_score(from, to);
        if effective_gbps <= 0.0 {
            return f64::INFINITY;
        }
        size_gb * 8.0 / effective_gbps
    }
}

/// Soft-saturating normalization of a non-negative quantity into [0, 1).
///
/// `scale` is the half-way point: `normalized(scale, scale) == 0.5`.
pub fn normalized(x: f64, scale: f64) -> f64 {
    if x <= 0.0 || scale <= 0.0 || x.is_nan() {
        return 0.0;
    }
    x / (x + scale)
}
