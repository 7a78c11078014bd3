//! Beta beliefs over rate parameters.
//!
//! A `Beta(alpha, beta)` belief combines conjugately with Bernoulli-derived
//! soft counts: observing `s` expected successes and `f` expected failures
//! yields `Beta(alpha + s, beta + f)`. Counts may be fractional, which is how
//! responsibilities from the mixture and noisy-OR factors enter.
//!
//! The CDF uses the regularized incomplete beta function with
//! a continued-fraction approximation (Numerical Recipes).

use serde::{Deserialize, Serialize};

use super::stable::{digamma, log_beta};

const BETACF_MAX_ITERS: usize = 200;
const BETACF_EPS: f64 = 3.0e-7;
const BETACF_FPMIN: f64 = 1.0e-30;

/// Beta belief `Beta(alpha, beta)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Beta {
    /// Shape parameter alpha (pseudo-successes).
    pub alpha: f64,
    /// Shape parameter beta (pseudo-failures).
    pub beta: f64,
}

impl Beta {
    /// Create new Beta parameters with validation.
    ///
    /// Returns None if parameters are invalid (non-positive, infinite or NaN).
    pub fn new(alpha: f64, beta: f64) -> Option<Self> {
        if !alpha.is_finite() || !beta.is_finite() || alpha <= 0.0 || beta <= 0.0 {
            return None;
        }
        Some(Self { alpha, beta })
    }

    /// Create Beta(1, 1) uniform prior.
    pub fn uniform() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
        }
    }

    /// Mean E[p] = alpha / (alpha + beta).
    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Variance Var[p] = alpha*beta / ((alpha+beta)^2 (alpha+beta+1)).
    pub fn variance(&self) -> f64 {
        let sum = self.alpha + self.beta;
        (self.alpha * self.beta) / (sum * sum * (sum + 1.0))
    }

    /// E[ln p] = psi(alpha) - psi(alpha + beta).
    pub fn expected_log(&self) -> f64 {
        digamma(self.alpha) - digamma(self.alpha + self.beta)
    }

    /// E[ln (1 - p)] = psi(beta) - psi(alpha + beta).
    pub fn expected_log_complement(&self) -> f64 {
        digamma(self.beta) - digamma(self.alpha + self.beta)
    }

    /// E[ln p - ln(1 - p)], the prior log-odds a Bernoulli(p) child receives
    /// under a variational message.
    pub fn expected_log_odds(&self) -> f64 {
        digamma(self.alpha) - digamma(self.beta)
    }

    /// Conjugate update with (possibly fractional) success/failure counts.
    ///
    /// Returns None if either count is negative or non-finite.
    pub fn with_soft_counts(&self, successes: f64, failures: f64) -> Option<Self> {
        if !successes.is_finite() || !failures.is_finite() || successes < 0.0 || failures < 0.0 {
            return None;
        }
        Self::new(self.alpha + successes, self.beta + failures)
    }

    /// Product of two Beta messages over the same variable.
    ///
    /// Returns None when the result is improper.
    pub fn product(&self, other: &Beta) -> Option<Self> {
        Self::new(self.alpha + other.alpha - 1.0, self.beta + other.beta - 1.0)
    }

    /// KL(self || other).
    pub fn kl_divergence(&self, other: &Beta) -> f64 {
        let (a1, b1) = (self.alpha, self.beta);
        let (a2, b2) = (other.alpha, other.beta);
        let psi_sum = digamma(a1 + b1);
        log_beta(a2, b2) - log_beta(a1, b1)
            + (a1 - a2) * (digamma(a1) - psi_sum)
            + (b1 - b2) * (digamma(b1) - psi_sum)
    }

    /// Central credible interval at `level` (e.g. 0.95).
    pub fn credible_interval(&self, level: f64) -> (f64, f64) {
        if level.is_nan() || level <= 0.0 || level >= 1.0 {
            return (f64::NAN, f64::NAN);
        }

        let tail = (1.0 - level) / 2.0;
        let lower = beta_inv_cdf(tail, self.alpha, self.beta);
        let upper = beta_inv_cdf(1.0 - tail, self.alpha, self.beta);

        (lower, upper)
    }
}

/// Log of the Beta PDF at x.
pub fn log_beta_pdf(x: f64, alpha: f64, beta: f64) -> f64 {
    if x.is_nan() || alpha.is_nan() || beta.is_nan() {
        return f64::NAN;
    }
    if alpha <= 0.0 || beta <= 0.0 {
        return f64::NAN;
    }
    if !(0.0..=1.0).contains(&x) {
        return f64::NEG_INFINITY;
    }
    if x == 0.0 {
        if alpha < 1.0 {
            return f64::INFINITY;
        }
        if alpha > 1.0 {
            return f64::NEG_INFINITY;
        }
        return -log_beta(1.0, beta);
    }
    if x == 1.0 {
        if beta < 1.0 {
            return f64::INFINITY;
        }
        if beta > 1.0 {
            return f64::NEG_INFINITY;
        }
        return -log_beta(alpha, 1.0);
    }
    let log_x = x.ln();
    let log_one_minus = (-x).ln_1p();
    (alpha - 1.0) * log_x + (beta - 1.0) * log_one_minus - log_beta(alpha, beta)
}

/// Regularized incomplete beta function I_x(a,b).
pub fn beta_cdf(x: f64, alpha: f64, beta: f64) -> f64 {
    if x.is_nan() || alpha.is_nan() || beta.is_nan() {
        return f64::NAN;
    }
    if alpha <= 0.0 || beta <= 0.0 {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_beta = log_beta(alpha, beta);
    let bt = (alpha * x.ln() + beta * (1.0 - x).ln() - ln_beta).exp();
    let threshold = (alpha + 1.0) / (alpha + beta + 2.0);
    if x < threshold {
        bt * betacf(alpha, beta, x) / alpha
    } else {
        1.0 - bt * betacf(beta, alpha, 1.0 - x) / beta
    }
}

/// Inverse CDF (quantile) for Beta(alpha, beta), by bisection.
pub fn beta_inv_cdf(p: f64, alpha: f64, beta: f64) -> f64 {
    if p.is_nan() || alpha.is_nan() || beta.is_nan() {
        return f64::NAN;
    }
    if alpha <= 0.0 || beta <= 0.0 {
        return f64::NAN;
    }
    if p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return 1.0;
    }

    let mut low = 0.0;
    let mut high = 1.0;
    let mut mid = 0.5;
    let tol = 1e-10;
    for _ in 0..200 {
        mid = 0.5 * (low + high);
        let cdf = beta_cdf(mid, alpha, beta);
        if cdf.is_nan() {
            return f64::NAN;
        }
        let delta = cdf - p;
        if delta.abs() < tol {
            return mid;
        }
        if delta < 0.0 {
            low = mid;
        } else {
            high = mid;
        }
    }
    mid
}

fn betacf(alpha: f64, beta: f64, x: f64) -> f64 {
    let qab = alpha + beta;
    let qap = alpha + 1.0;
    let qam = alpha - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < BETACF_FPMIN {
        d = BETACF_FPMIN;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=BETACF_MAX_ITERS {
        let m_f = m as f64;
        let m2 = 2.0 * m_f;
        let aa = m_f * (beta - m_f) * x / ((qam + m2) * (alpha + m2));
        d = 1.0 + aa * d;
        if d.abs() < BETACF_FPMIN {
            d = BETACF_FPMIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < BETACF_FPMIN {
            c = BETACF_FPMIN;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(alpha + m_f) * (qab + m_f) * x / ((alpha + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < BETACF_FPMIN {
            d = BETACF_FPMIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < BETACF_FPMIN {
            c = BETACF_FPMIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < BETACF_EPS {
            break;
        }
    }

    h
}
