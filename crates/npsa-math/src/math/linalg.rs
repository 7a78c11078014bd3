//! Dense symmetric-matrix helpers on top of nalgebra.
//!
//! Every precision or rate matrix that leaves a moment-matching step goes
//! through [`repair_positive_definite`]: symmetrize, eigendecompose, and clip
//! eigenvalues below `floor * max_eigenvalue`. A matrix with no positive
//! spectrum (or any non-finite entry) cannot be repaired and is reported as
//! [`MathError::NotPositiveDefinite`] / [`MathError::NonFinite`].

use nalgebra::{DMatrix, DVector};

use crate::error::MathError;

/// Result of a positive-definite repair.
#[derive(Debug, Clone)]
pub struct Repaired {
    pub matrix: DMatrix<f64>,
    /// Number of eigenvalues raised to the floor.
    pub clipped: usize,
}

/// `(m + m^T) / 2`.
pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    (m + m.transpose()) * 0.5
}

pub fn all_finite(m: &DMatrix<f64>) -> bool {
    m.iter().all(|v| v.is_finite())
}

/// Project a symmetric matrix onto the positive-definite cone by
/// eigenvalue flooring. `relative_floor` is relative to the largest
/// eigenvalue.
pub fn repair_positive_definite(
    m: &DMatrix<f64>,
    relative_floor: f64,
) -> Result<Repaired, MathError> {
    if !m.is_square() {
        return Err(MathError::DimensionMismatch {
            expected: m.nrows(),
            actual: m.ncols(),
        });
    }
    if !all_finite(m) {
        return Err(MathError::NonFinite { what: "matrix" });
    }

    let eigen = symmetrize(m).symmetric_eigen();
    let max_eigenvalue = eigen
        .eigenvalues
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    if !max_eigenvalue.is_finite() || max_eigenvalue <= 0.0 {
        return Err(MathError::NotPositiveDefinite { max_eigenvalue });
    }

    let floor = relative_floor.max(f64::EPSILON) * max_eigenvalue;
    let mut clipped = 0;
    let floored: DVector<f64> = eigen.eigenvalues.map(|v| {
        if v < floor {
            clipped += 1;
            floor
        } else {
            v
        }
    });

    let vecs = &eigen.eigenvectors;
    let matrix = symmetrize(&(vecs * DMatrix::from_diagonal(&floored) * vecs.transpose()));
    Ok(Repaired { matrix, clipped })
}

/// Inverse of a symmetric positive-definite matrix via Cholesky.
pub fn inverse_pd(m: &DMatrix<f64>) -> Result<DMatrix<f64>, MathError> {
    match m.clone().cholesky() {
        Some(chol) => Ok(symmetrize(&chol.inverse())),
        None => Err(not_pd(m)),
    }
}

/// `ln |m|` for a symmetric positive-definite matrix.
pub fn log_det_pd(m: &DMatrix<f64>) -> Result<f64, MathError> {
    let chol = m.clone().cholesky().ok_or_else(|| not_pd(m))?;
    let l = chol.l();
    Ok(2.0 * l.diagonal().iter().map(|d| d.ln()).sum::<f64>())
}

/// `x^T m x`.
pub fn quadratic_form(m: &DMatrix<f64>, x: &DVector<f64>) -> f64 {
    (x.transpose() * m * x)[(0, 0)]
}

fn not_pd(m: &DMatrix<f64>) -> MathError {
    let max_eigenvalue = if all_finite(m) && m.is_square() {
        symmetrize(m)
            .symmetric_eigenvalues()
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max)
    } else {
        f64::NAN
    };
    MathError::NotPositiveDefinite { max_eigenvalue }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        if a.is_nan() || b.is_nan() {
            return false;
        }
        (a - b).abs() <= tol
    }

    #[test]
    fn repair_leaves_pd_matrix_alone() {
        let m = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
        let r = repair_positive_definite(&m, 1e-9).unwrap();
        assert_eq!(r.clipped, 0);
        for (a, b) in r.matrix.iter().zip(m.iter()) {
            assert!(approx_eq(*a, *b, 1e-10));
        }
    }

    #[test]
    fn repair_floors_negative_eigenvalues() {
        // eigenvalues 3 and -1
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        let r = repair_positive_definite(&m, 1e-3).unwrap();
        assert_eq!(r.clipped, 1);
        assert!(r.matrix.clone().cholesky().is_some());
        let eig = r.matrix.symmetric_eigenvalues();
        let min = eig.iter().cloned().fold(f64::INFINITY, f64::min);
        assert!(approx_eq(min, 3e-3, 1e-9));
    }

    #[test]
    fn repair_rejects_negative_definite() {
        let m = DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, -2.0]);
        assert!(matches!(
            repair_positive_definite(&m, 1e-9),
            Err(MathError::NotPositiveDefinite { .. })
        ));
    }

    #[test]
    fn repair_rejects_non_finite() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, f64::NAN, 0.0, 1.0]);
        assert!(matches!(
            repair_positive_definite(&m, 1e-9),
            Err(MathError::NonFinite { .. })
        ));
    }

    #[test]
    fn inverse_and_log_det() {
        let m = DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 0.0, 0.25]);
        let inv = inverse_pd(&m).unwrap();
        assert!(approx_eq(inv[(0, 0)], 0.25, 1e-12));
        assert!(approx_eq(inv[(1, 1)], 4.0, 1e-12));
        assert!(approx_eq(log_det_pd(&m).unwrap(), 0.0, 1e-12));
        let bad = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(inverse_pd(&bad).is_err());
    }

    #[test]
    fn quadratic_form_identity() {
        let m = DMatrix::<f64>::identity(3, 3);
        let x = DVector::from_vec(vec![1.0, 2.0, 2.0]);
        assert!(approx_eq(quadratic_form(&m, &x), 9.0, 1e-12));
    }
}
