//! Univariate Gaussian beliefs and the truncated-Gaussian moment match.
//!
//! The truncation routine is what enforces ordering constraints between
//! component means: given `x ~ N(m, v)` and the hard constraint `x > 0`, the
//! moment-matched Gaussian has
//!
//! ```text
//! t      = m / sqrt(v)
//! lambda = phi(t) / Phi(t)
//! mean'  = m + sqrt(v) * lambda
//! var'   = v * (1 - lambda * (lambda + t))
//! ```
//!
//! `lambda` is computed in the log domain so that strongly violated
//! constraints (t << 0) neither underflow nor divide 0 by 0.

use serde::{Deserialize, Serialize};

use crate::error::MathError;

const LOG_SQRT_2PI: f64 = 0.918_938_533_204_672_8;
const FRAC_1_SQRT_2: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Upper bound on the variance shrink factor so the result stays proper.
const MAX_SHRINK: f64 = 1.0 - 1e-12;

/// Gaussian belief `N(mean, 1/precision)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gaussian {
    pub mean: f64,
    pub precision: f64,
}

impl Gaussian {
    pub fn new(mean: f64, precision: f64) -> Result<Self, MathError> {
        if !mean.is_finite() {
            return Err(MathError::NonFinite { what: "gaussian mean" });
        }
        if !precision.is_finite() || precision <= 0.0 {
            return Err(MathError::InvalidParameter {
                name: "precision",
                value: precision,
            });
        }
        Ok(Self { mean, precision })
    }

    pub fn from_mean_variance(mean: f64, variance: f64) -> Result<Self, MathError> {
        if !variance.is_finite() || variance <= 0.0 {
            return Err(MathError::InvalidParameter {
                name: "variance",
                value: variance,
            });
        }
        Self::new(mean, 1.0 / variance)
    }

    pub fn variance(&self) -> f64 {
        1.0 / self.precision
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Product of two Gaussian messages over the same variable.
    pub fn product(&self, other: &Gaussian) -> Gaussian {
        let precision = self.precision + other.precision;
        let mean = (self.precision * self.mean + other.precision * other.mean) / precision;
        Gaussian { mean, precision }
    }

    /// Quotient `self / other`.
    ///
    /// Fails when the quotient is improper (other is at least as precise).
    pub fn divide(&self, other: &Gaussian) -> Result<Gaussian, MathError> {
        let precision = self.precision - other.precision;
        if precision <= 0.0 {
            return Err(MathError::InvalidParameter {
                name: "precision",
                value: precision,
            });
        }
        let mean = (self.precision * self.mean - other.precision * other.mean) / precision;
        Gaussian::new(mean, precision)
    }

    pub fn log_pdf(&self, x: f64) -> f64 {
        let d = x - self.mean;
        0.5 * self.precision.ln() - LOG_SQRT_2PI - 0.5 * self.precision * d * d
    }

    /// KL(self || other).
    pub fn kl_divergence(&self, other: &Gaussian) -> f64 {
        let v1 = self.variance();
        let v2 = other.variance();
        let d = self.mean - other.mean;
        0.5 * ((v2 / v1).ln() + (v1 + d * d) / v2 - 1.0)
    }
}

/// Mean shift (in standard deviations) and variance shrink factor for a
/// Gaussian `N(mean, variance)` conditioned on `x > 0`.
///
/// Returns `(lambda, lambda * (lambda + t))`, the shrink clamped below 1.
pub fn positive_truncation_factors(mean: f64, variance: f64) -> (f64, f64) {
    let t = mean / variance.sqrt();
    let lambda = inverse_mills_ratio(t);
    let shrink = (lambda * (lambda + t)).clamp(0.0, MAX_SHRINK);
    (lambda, shrink)
}

/// phi(t) / Phi(t), evaluated in the log domain.
pub fn inverse_mills_ratio(t: f64) -> f64 {
    (log_normal_pdf(t) - log_normal_cdf(t)).exp()
}

/// Standard normal log density.
pub fn log_normal_pdf(t: f64) -> f64 {
    -0.5 * t * t - LOG_SQRT_2PI
}

/// Standard normal CDF.
pub fn normal_cdf(t: f64) -> f64 {
    0.5 * erfc(-t * FRAC_1_SQRT_2)
}

/// log Phi(t), accurate far into the lower tail.
pub fn log_normal_cdf(t: f64) -> f64 {
    log_erfc(-t * FRAC_1_SQRT_2) - std::f64::consts::LN_2
}

/// Complementary error function (Chebyshev fit, fractional error < 1.2e-7).
pub fn erfc(x: f64) -> f64 {
    if x >= 0.0 {
        log_erfc_nonneg(x).exp()
    } else {
        2.0 - log_erfc_nonneg(-x).exp()
    }
}

/// log erfc(x) without underflow for large positive x.
pub fn log_erfc(x: f64) -> f64 {
    if x >= 0.0 {
        log_erfc_nonneg(x)
    } else {
        (2.0 - log_erfc_nonneg(-x).exp()).ln()
    }
}

fn log_erfc_nonneg(z: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87
                                    + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    t.ln() - z * z + poly
}
