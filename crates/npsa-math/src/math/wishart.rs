//! Wishart beliefs over precision matrices.
//!
//! Stored in shape/rate form:
//!
//! ```text
//! p(X) ∝ |X|^(a - (d+1)/2) exp(-tr(R X))
//! E[X]       = a R^-1
//! E[ln |X|]  = sum_{i=0}^{d-1} psi(a - i/2) - ln |R|
//! ```
//!
//! Configuration supplies `(shape, scale)` with mean `shape * scale`, so the
//! rate is `scale^-1`.

use nalgebra::DMatrix;

use super::linalg::{inverse_pd, log_det_pd, repair_positive_definite, symmetrize};
use super::stable::digamma;
use crate::error::MathError;

#[derive(Debug, Clone, PartialEq)]
pub struct Wishart {
    shape: f64,
    rate: DMatrix<f64>,
    mean: DMatrix<f64>,
    rate_log_det: f64,
}

impl Wishart {
    pub fn from_shape_rate(shape: f64, rate: DMatrix<f64>) -> Result<Self, MathError> {
        if !rate.is_square() {
            return Err(MathError::DimensionMismatch {
                expected: rate.nrows(),
                actual: rate.ncols(),
            });
        }
        let d = rate.nrows() as f64;
        if !shape.is_finite() || shape <= (d - 1.0) / 2.0 {
            return Err(MathError::InvalidParameter {
                name: "wishart shape",
                value: shape,
            });
        }
        let rate = symmetrize(&rate);
        let mean = inverse_pd(&rate)? * shape;
        let rate_log_det = log_det_pd(&rate)?;
        Ok(Self {
            shape,
            rate,
            mean,
            rate_log_det,
        })
    }

    pub fn from_shape_scale(shape: f64, scale: &DMatrix<f64>) -> Result<Self, MathError> {
        let rate = inverse_pd(scale)?;
        Self::from_shape_rate(shape, rate)
    }

    /// `shape` with a diagonal scale matrix.
    pub fn diagonal(shape: f64, scale_diagonal: &[f64]) -> Result<Self, MathError> {
        for &s in scale_diagonal {
            if !s.is_finite() || s <= 0.0 {
                return Err(MathError::InvalidParameter {
                    name: "wishart scale",
                    value: s,
                });
            }
        }
        let rate = DMatrix::from_diagonal(&nalgebra::DVector::from_iterator(
            scale_diagonal.len(),
            scale_diagonal.iter().map(|s| 1.0 / s),
        ));
        Self::from_shape_rate(shape, rate)
    }

    pub fn dim(&self) -> usize {
        self.rate.nrows()
    }

    pub fn shape(&self) -> f64 {
        self.shape
    }

    pub fn rate(&self) -> &DMatrix<f64> {
        &self.rate
    }

    /// `E[X]`.
    pub fn mean(&self) -> &DMatrix<f64> {
        &self.mean
    }

    /// `E[ln |X|]`.
    pub fn expected_log_det(&self) -> f64 {
        let psi: f64 = (0..self.dim())
            .map(|i| digamma(self.shape - i as f64 / 2.0))
            .sum();
        psi - self.rate_log_det
    }

    /// `E[X]^-1`, the covariance reported for a precision belief.
    pub fn covariance_estimate(&self) -> DMatrix<f64> {
        &self.rate / self.shape
    }

    /// Conjugate-style projection after absorbing `count` soft observations
    /// with expected scatter `scatter`:
    ///
    /// `a = a0 + count/2`, `R = repair(R0 + scatter/2)`.
    ///
    /// Returns the new belief and the number of eigenvalues floored.
    pub fn project_from_scatter(
        &self,
        count: f64,
        scatter: &DMatrix<f64>,
        relative_floor: f64,
    ) -> Result<(Wishart, usize), MathError> {
        if scatter.shape() != self.rate.shape() {
            return Err(MathError::DimensionMismatch {
                expected: self.dim(),
                actual: scatter.nrows(),
            });
        }
        if !count.is_finite() || count < 0.0 {
            return Err(MathError::InvalidParameter {
                name: "soft count",
                value: count,
            });
        }
        let raw = &self.rate + scatter * 0.5;
        let repaired = repair_positive_definite(&raw, relative_floor)?;
        let next = Self::from_shape_rate(self.shape + 0.5 * count, repaired.matrix)?;
        Ok((next, repaired.clipped))
    }

    /// Largest absolute entrywise change in `E[X]`.
    pub fn max_mean_change(&self, other: &Wishart) -> f64 {
        self.mean
            .iter()
            .zip(other.mean.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}
