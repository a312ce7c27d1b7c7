//! Projection onto the probability simplex.
//!
//! Adaptive weight vectors must stay non-negative and sum to 1. The
//! projection clips negatives to zero and renormalizes; a degenerate
//! all-zero vector falls back to uniform.

/// Tolerance on the simplex sum invariant.
pub const SIMPLEX_TOLERANCE: f64 = 0.01;

/// Project `weights` onto the probability simplex in place.
///
/// Non-finite entries are treated as zero. Returns the pre-projection sum
/// so callers can detect how far the vector had drifted.
pub fn project_to_simplex(weights: &mut [f64]) -> f64 {
    if weights.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0;
    for w in weights.iter_mut() {
        if !w.is_finite() || *w < 0.0 {
            *w = 0.0;
        }
        sum += *w;
    }
    if sum <= 0.0 {
        let uniform = 1.0 / weights.len() as f64;
        for w in weights.iter_mut() {
            *w = uniform;
        }
        return sum;
    }
    for w in weights.iter_mut() {
        *w /= sum;
    }
    sum
}

/// Whether `weights` lies on the simplex within `tol`.
pub fn is_on_simplex(weights: &[f64], tol: f64) -> bool {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return false;
    }
    let sum: f64 = weights.iter().sum();
    (sum - 1.0).abs() <= tol
}

/// Euclidean distance between two weight vectors.
///
/// Vectors of different lengths compare as infinitely far apart.
pub fn l2_distance(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
