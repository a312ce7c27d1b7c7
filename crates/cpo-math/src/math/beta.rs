//! Beta posteriors for Bernoulli success tracking.
//!
//! Provides mean/variance helpers, the regularized incomplete beta
//! function (continued-fraction approximation, Numerical Recipes), its
//! inverse, and a [`BetaPosterior`] type with conjugate updates, decay
//! toward the prior, and inverse-CDF sampling.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::stable::log_beta;

/// A Beta distribution is proper only for positive parameters.
fn proper(alpha: f64, beta: f64) -> bool {
    alpha > 0.0 && beta > 0.0
}

/// Mean of Beta(alpha, beta).
pub fn beta_mean(alpha: f64, beta: f64) -> f64 {
    if !proper(alpha, beta) {
        return f64::NAN;
    }
    alpha / (alpha + beta)
}

/// Variance of Beta(alpha, beta).
pub fn beta_var(alpha: f64, beta: f64) -> f64 {
    if !proper(alpha, beta) {
        return f64::NAN;
    }
    let total = alpha + beta;
    alpha * beta / (total.powi(2) * (total + 1.0))
}

/// Regularized incomplete beta function I_x(a, b).
///
/// The continued fraction converges quickly only below the
/// distribution's mode, so the upper tail is evaluated through the
/// symmetry `I_x(a,b) = 1 - I_{1-x}(b,a)`.
pub fn beta_cdf(x: f64, alpha: f64, beta: f64) -> f64 {
    if !proper(alpha, beta) || x.is_nan() {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    // Prefactor x^a (1-x)^b / B(a,b), assembled in the log domain.
    let prefactor = (alpha * x.ln() + beta * (-x).ln_1p() - log_beta(alpha, beta)).exp();
    let crossover = (alpha + 1.0) / (alpha + beta + 2.0);
    if x < crossover {
        prefactor * incomplete_beta_cf(x, alpha, beta) / alpha
    } else {
        1.0 - prefactor * incomplete_beta_cf(1.0 - x, beta, alpha) / beta
    }
}

/// Quantile function for Beta(alpha, beta), by bisection on the CDF.
///
/// The CDF is monotone on [0, 1], so halving the bracket is robust for
/// every proper parameter pair; 200 halvings is far past f64
/// resolution.
pub fn beta_inv_cdf(p: f64, alpha: f64, beta: f64) -> f64 {
    if !proper(alpha, beta) || p.is_nan() {
        return f64::NAN;
    }
    if p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return 1.0;
    }

    const MAX_HALVINGS: usize = 200;
    const MASS_TOLERANCE: f64 = 1e-10;

    let mut lo = 0.0_f64;
    let mut hi = 1.0_f64;
    for _ in 0..MAX_HALVINGS {
        let probe = 0.5 * (lo + hi);
        let mass = beta_cdf(probe, alpha, beta);
        if mass.is_nan() {
            return f64::NAN;
        }
        if (mass - p).abs() < MASS_TOLERANCE {
            return probe;
        }
        if mass < p {
            lo = probe;
        } else {
            hi = probe;
        }
    }
    0.5 * (lo + hi)
}

/// Continued fraction for the incomplete beta function, evaluated with
/// the modified Lentz scheme. Each pass applies one even- and one
/// odd-numbered coefficient of the expansion.
fn incomplete_beta_cf(x: f64, a: f64, b: f64) -> f64 {
    const MAX_PASSES: usize = 200;
    const CONVERGED: f64 = 3.0e-7;
    const FLOOR: f64 = 1.0e-30;

    // Denominators near zero are floored to keep the recurrence finite.
    let guard = |v: f64| if v.abs() < FLOOR { FLOOR } else { v };

    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - (a + b) * x / (a + 1.0));
    let mut value = d;

    for pass in 1..=MAX_PASSES {
        let m = pass as f64;

        let even = m * (b - m) * x / ((a - 1.0 + 2.0 * m) * (a + 2.0 * m));
        d = 1.0 / guard(1.0 + even * d);
        c = guard(1.0 + even / c);
        value *= d * c;

        let odd = -(a + m) * (a + b + m) * x / ((a + 2.0 * m) * (a + 1.0 + 2.0 * m));
        d = 1.0 / guard(1.0 + odd * d);
        c = guard(1.0 + odd / c);
        let step = d * c;
        value *= step;

        if (step - 1.0).abs() < CONVERGED {
            break;
        }
    }

    value
}

/// A Beta(alpha, beta) posterior over a Bernoulli success probability.
///
/// Starts at the uniform prior Beta(1,1). Successes and failures apply
/// conjugate updates; `decay` shrinks both parameters toward the prior
/// floor to re-emphasize recent evidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaPosterior {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for BetaPosterior {
    fn default() -> Self {
        Self::uniform()
    }
}

impl BetaPosterior {
    /// The uniform prior Beta(1,1).
    pub fn uniform() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
        }
    }

    /// Conjugate update: success increments alpha, failure increments beta.
    pub fn observe(&mut self, success: bool) {
        if success {
            self.alpha += 1.0;
        } else {
            self.beta += 1.0;
        }
    }

    /// Multiply both parameters by `factor`, floored at `floor`.
    ///
    /// Used for periodic recency decay; `floor` >= 1 keeps the posterior
    /// proper.
    pub fn decay(&mut self, factor: f64, floor: f64) {
        self.alpha = (self.alpha * factor).max(floor);
        self.beta = (self.beta * factor).max(floor);
    }

    /// Posterior mean.
    pub fn mean(&self) -> f64 {
        beta_mean(self.alpha, self.beta)
    }

    /// Posterior variance.
    pub fn variance(&self) -> f64 {
        beta_var(self.alpha, self.beta)
    }

    /// Draw one value from the posterior via the inverse CDF.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.random();
        beta_inv_cdf(u, self.alpha, self.beta)
    }

    /// Total pseudo-observation count (alpha + beta).
    pub fn weight(&self) -> f64 {
        self.alpha + self.beta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    // NaN on either side makes the comparison fail.
    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn moments_match_closed_form() {
        // Beta(3, 9): mean 1/4, variance 27 / (144 * 13).
        assert!(close(beta_mean(3.0, 9.0), 0.25, 1e-12));
        assert!(close(beta_var(3.0, 9.0), 27.0 / (144.0 * 13.0), 1e-12));
        assert!(beta_mean(0.0, 1.0).is_nan());
        assert!(beta_var(2.0, f64::NAN).is_nan());
    }

    #[test]
    fn uniform_cdf_is_the_identity() {
        for x in [0.1, 0.42, 0.9] {
            assert!(close(beta_cdf(x, 1.0, 1.0), x, 1e-6));
        }
    }

    #[test]
    fn cdf_is_monotone_and_bounded() {
        let mut prev = 0.0;
        for i in 1..10 {
            let x = i as f64 / 10.0;
            let mass = beta_cdf(x, 2.0, 5.0);
            assert!(mass >= prev);
            assert!((0.0..=1.0).contains(&mass));
            prev = mass;
        }
    }

    #[test]
    fn quantile_inverts_the_cdf() {
        for p in [0.05, 0.25, 0.5, 0.9] {
            let x = beta_inv_cdf(p, 2.5, 4.0);
            assert!(close(beta_cdf(x, 2.5, 4.0), p, 1e-6));
        }
    }

    #[test]
    fn posterior_observe_shifts_mean() {
        let mut post = BetaPosterior::uniform();
        let prior_mean = post.mean();
        for _ in 0..10 {
            post.observe(true);
        }
        assert!(post.mean() > prior_mean);
        assert!(close(post.alpha, 11.0, 1e-12));
        assert!(close(post.beta, 1.0, 1e-12));
    }

    #[test]
    fn posterior_decay_floors_at_prior() {
        let mut post = BetaPosterior {
            alpha: 10.0,
            beta: 4.0,
        };
        for _ in 0..200 {
            post.decay(0.95, 1.0);
        }
        assert!(post.alpha >= 1.0);
        assert!(post.beta >= 1.0);
        assert!(close(post.beta, 1.0, 1e-9));
    }

    #[test]
    fn sample_stays_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(7);
        let post = BetaPosterior {
            alpha: 3.0,
            beta: 2.0,
        };
        for _ in 0..100 {
            let x = post.sample(&mut rng);
            assert!((0.0..=1.0).contains(&x));
        }
    }

    #[test]
    fn sample_mean_tracks_posterior_mean() {
        let mut rng = StdRng::seed_from_u64(42);
        let post = BetaPosterior {
            alpha: 8.0,
            beta: 2.0,
        };
        let n = 2000;
        let sum: f64 = (0..n).map(|_| post.sample(&mut rng)).sum();
        let empirical = sum / n as f64;
        assert!(close(empirical, post.mean(), 0.02));
    }
}
