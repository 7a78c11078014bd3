//! Multivariate Gaussian beliefs in mean/precision form.

use nalgebra::{DMatrix, DVector};

use super::linalg::{inverse_pd, log_det_pd, quadratic_form, symmetrize};
use crate::error::MathError;

/// `N(mean, precision^-1)` over a `dim`-vector.
///
/// The covariance is cached because every consumer (expected log-likelihood,
/// constraint projection, output) needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorGaussian {
    mean: DVector<f64>,
    precision: DMatrix<f64>,
    covariance: DMatrix<f64>,
}

impl VectorGaussian {
    pub fn from_mean_precision(
        mean: DVector<f64>,
        precision: DMatrix<f64>,
    ) -> Result<Self, MathError> {
        check_shape(&mean, &precision)?;
        let precision = symmetrize(&precision);
        let covariance = inverse_pd(&precision)?;
        Self::from_parts(mean, precision, covariance)
    }

    pub fn from_mean_covariance(
        mean: DVector<f64>,
        covariance: DMatrix<f64>,
    ) -> Result<Self, MathError> {
        check_shape(&mean, &covariance)?;
        let covariance = symmetrize(&covariance);
        let precision = inverse_pd(&covariance)?;
        Self::from_parts(mean, precision, covariance)
    }

    /// Independent per-dimension prior `N(mean[d], 1/precision[d])`.
    pub fn diagonal(mean: &[f64], precision: &[f64]) -> Result<Self, MathError> {
        if mean.len() != precision.len() {
            return Err(MathError::DimensionMismatch {
                expected: mean.len(),
                actual: precision.len(),
            });
        }
        for &p in precision {
            if !p.is_finite() || p <= 0.0 {
                return Err(MathError::InvalidParameter {
                    name: "precision",
                    value: p,
                });
            }
        }
        let prec = DMatrix::from_diagonal(&DVector::from_column_slice(precision));
        Self::from_mean_precision(DVector::from_column_slice(mean), prec)
    }

    /// Build from natural parameters `(precision * mean, precision)`.
    pub fn from_natural(
        precision_mean: &DVector<f64>,
        precision: DMatrix<f64>,
    ) -> Result<Self, MathError> {
        check_shape(precision_mean, &precision)?;
        let precision = symmetrize(&precision);
        let covariance = inverse_pd(&precision)?;
        let mean = &covariance * precision_mean;
        Self::from_parts(mean, precision, covariance)
    }

    fn from_parts(
        mean: DVector<f64>,
        precision: DMatrix<f64>,
        covariance: DMatrix<f64>,
    ) -> Result<Self, MathError> {
        if mean.iter().any(|v| !v.is_finite()) {
            return Err(MathError::NonFinite { what: "mean vector" });
        }
        Ok(Self {
            mean,
            precision,
            covariance,
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    pub fn precision(&self) -> &DMatrix<f64> {
        &self.precision
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    /// Natural mean parameter `precision * mean`.
    pub fn precision_mean(&self) -> DVector<f64> {
        &self.precision * &self.mean
    }

    /// Product of two Gaussian messages over the same vector.
    pub fn product(&self, other: &VectorGaussian) -> Result<VectorGaussian, MathError> {
        if self.dim() != other.dim() {
            return Err(MathError::DimensionMismatch {
                expected: self.dim(),
                actual: other.dim(),
            });
        }
        let eta = self.precision_mean() + other.precision_mean();
        Self::from_natural(&eta, &self.precision + &other.precision)
    }

    /// Moment-form update: shift the mean and subtract a rank-one term from
    /// the covariance, then rebuild the precision.
    pub fn with_rank_one_update(
        &self,
        mean_shift: &DVector<f64>,
        covariance_column: &DVector<f64>,
        shrink: f64,
    ) -> Result<VectorGaussian, MathError> {
        let mean = &self.mean + mean_shift;
        let cov = &self.covariance - covariance_column * covariance_column.transpose() * shrink;
        Self::from_mean_covariance(mean, cov)
    }

    /// `E[(x - mu)^T A (x - mu)]` under this belief, for a fixed point `x`.
    pub fn expected_quadratic(&self, a: &DMatrix<f64>, x: &DVector<f64>) -> f64 {
        let d = x - &self.mean;
        quadratic_form(a, &d) + (a * &self.covariance).trace()
    }

    /// `E[(x - mu)(x - mu)^T]` for a fixed point `x`.
    pub fn expected_outer(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let d = x - &self.mean;
        &d * d.transpose() + &self.covariance
    }

    /// Largest absolute change of any mean coordinate.
    pub fn max_mean_change(&self, other: &VectorGaussian) -> f64 {
        self.mean
            .iter()
            .zip(other.mean.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    /// KL(self || other).
    pub fn kl_divergence(&self, other: &VectorGaussian) -> Result<f64, MathError> {
        let k = self.dim() as f64;
        let d = &other.mean - &self.mean;
        let trace = (&other.precision * &self.covariance).trace();
        let log_det_ratio = log_det_pd(&self.precision)? - log_det_pd(&other.precision)?;
        Ok(0.5 * (trace + quadratic_form(&other.precision, &d) - k + log_det_ratio))
    }
}

fn check_shape(v: &DVector<f64>, m: &DMatrix<f64>) -> Result<(), MathError> {
    if m.nrows() != v.len() || m.ncols() != v.len() {
        return Err(MathError::DimensionMismatch {
            expected: v.len(),
            actual: m.nrows().max(m.ncols()),
        });
    }
    Ok(())
}
