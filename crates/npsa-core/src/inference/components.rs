//! Mixture parameter updates: component means, precisions and the shared
//! bad-site weight.
//!
//! Each sweep recomputes the parameter beliefs from their priors and the
//! soft assignments `r = q(isBadSite)` of the OBSERVED sites:
//!
//! ```text
//! q(mu_k):  P = P0 + N_k E[L_k],   P m = P0 m0 + E[L_k] sum_s r_ks x_s
//! q(L_k):   a = a0 + N_k / 2,      R = R0 + 1/2 sum_s r_ks E[(x_s - mu_k)(x_s - mu_k)^T]
//! q(pi):    Beta(alpha0 + N_bad, beta0 + N_good)
//! ```
//!
//! The ordering constraint `mu_bad[d] < mu_good[d]` is applied to the fresh
//! mean beliefs by moment matching the truncated difference, one dimension
//! at a time.

use nalgebra::{DMatrix, DVector};
use npsa_math::{positive_truncation_factors, Bernoulli, Beta, MathError, VectorGaussian, Wishart};

use crate::model::{ModelGraph, BAD, GOOD};

/// Passes over the dimensions before the ordering projection gives up.
pub const MAX_ORDERING_PASSES: usize = 8;

/// Updated mixture parameter beliefs.
#[derive(Debug, Clone)]
pub struct ComponentUpdate {
    pub means: [VectorGaussian; 2],
    pub precisions: [Wishart; 2],
    pub weights: Beta,
    /// Eigenvalues floored while repairing the precision rate matrices.
    pub clipped: usize,
}

/// Which parameter failed to update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    GoodMean,
    BadMean,
    GoodPrecision,
    BadPrecision,
    Weights,
    Ordering,
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Parameter::GoodMean => "good component mean",
            Parameter::BadMean => "bad component mean",
            Parameter::GoodPrecision => "good component precision",
            Parameter::BadPrecision => "bad component precision",
            Parameter::Weights => "mixing weight",
            Parameter::Ordering => "component ordering",
        };
        write!(f, "{}", s)
    }
}

/// Soft-count statistics for one component.
struct Stats {
    count: f64,
    sum: DVector<f64>,
}

fn responsibilities(graph: &ModelGraph, sites: &[Bernoulli]) -> [Stats; 2] {
    let dim = graph.kpi_dimension;
    let mut stats = [
        Stats {
            count: 0.0,
            sum: DVector::zeros(dim),
        },
        Stats {
            count: 0.0,
            sum: DVector::zeros(dim),
        },
    ];
    for (row, &s) in graph.observed_sites.iter().enumerate() {
        let x = graph.kpi(row);
        for (k, r) in [(GOOD, sites[s].prob_false()), (BAD, sites[s].prob_true())] {
            stats[k].count += r;
            stats[k].sum.axpy(r, x, 1.0);
        }
    }
    stats
}

fn update_mean(
    prior: &VectorGaussian,
    precision: &Wishart,
    stats: &Stats,
) -> Result<VectorGaussian, MathError> {
    let expected = precision.mean();
    let p = prior.precision() + expected * stats.count;
    let eta = prior.precision_mean() + expected * &stats.sum;
    VectorGaussian::from_natural(&eta, p)
}

fn scatter(
    graph: &ModelGraph,
    sites: &[Bernoulli],
    mean: &VectorGaussian,
    component: usize,
) -> DMatrix<f64> {
    let dim = graph.kpi_dimension;
    let mut total = DMatrix::zeros(dim, dim);
    for (row, &s) in graph.observed_sites.iter().enumerate() {
        let r = if component == BAD {
            sites[s].prob_true()
        } else {
            sites[s].prob_false()
        };
        if r > 0.0 {
            total += mean.expected_outer(graph.kpi(row)) * r;
        }
    }
    total
}

fn unordered_dimensions(good: &VectorGaussian, bad: &VectorGaussian) -> usize {
    (0..good.dim())
        .filter(|&d| bad.mean()[d] >= good.mean()[d])
        .count()
}

/// Enforce `bad.mean[d] < good.mean[d]` for every dimension.
///
/// The first pass projects every dimension; later passes revisit only the
/// dimensions a correlated update pushed back out of order. Fails with
/// [`MathError::ConstraintViolated`] if dimensions are still out of order
/// after `max_passes`.
pub fn enforce_ordering(
    good: &mut VectorGaussian,
    bad: &mut VectorGaussian,
    max_passes: usize,
) -> Result<(), MathError> {
    let dim = good.dim();
    for pass in 0..max_passes {
        let mut projected = 0;
        for d in 0..dim {
            if pass > 0 && bad.mean()[d] < good.mean()[d] {
                continue;
            }
            let variance = good.covariance()[(d, d)] + bad.covariance()[(d, d)];
            if !(variance.is_finite() && variance > 0.0) {
                return Err(MathError::NonFinite {
                    what: "ordering variance",
                });
            }
            let sd = variance.sqrt();
            let (lambda, shrink) =
                positive_truncation_factors(good.mean()[d] - bad.mean()[d], variance);

            let good_col = good.covariance().column(d).into_owned();
            let bad_col = bad.covariance().column(d).into_owned();
            let scale = shrink / variance;
            *good = good.with_rank_one_update(&(&good_col * (lambda / sd)), &good_col, scale)?;
            *bad = bad.with_rank_one_update(&(&bad_col * (-lambda / sd)), &bad_col, scale)?;
            projected += 1;
        }
        if projected == 0 || unordered_dimensions(good, bad) == 0 {
            break;
        }
    }
    match unordered_dimensions(good, bad) {
        0 => Ok(()),
        count => Err(MathError::ConstraintViolated {
            what: "component ordering",
            count,
        }),
    }
}

/// Recompute the mixture parameters from the priors and the site beliefs.
///
/// `precisions` are the previous sweep's precision beliefs, used by the
/// mean update.
pub fn update_components(
    graph: &ModelGraph,
    sites: &[Bernoulli],
    precisions: &[Wishart; 2],
    eigenvalue_floor: f64,
) -> Result<ComponentUpdate, (Parameter, MathError)> {
    let priors = &graph.priors;
    let [good_stats, bad_stats] = responsibilities(graph, sites);

    let mut good = update_mean(&priors.means[GOOD], &precisions[GOOD], &good_stats)
        .map_err(|e| (Parameter::GoodMean, e))?;
    let mut bad = update_mean(&priors.means[BAD], &precisions[BAD], &bad_stats)
        .map_err(|e| (Parameter::BadMean, e))?;
    enforce_ordering(&mut good, &mut bad, MAX_ORDERING_PASSES)
        .map_err(|e| (Parameter::Ordering, e))?;

    let (good_prec, good_clipped) = priors.precisions[GOOD]
        .project_from_scatter(
            good_stats.count,
            &scatter(graph, sites, &good, GOOD),
            eigenvalue_floor,
        )
        .map_err(|e| (Parameter::GoodPrecision, e))?;
    let (bad_prec, bad_clipped) = priors.precisions[BAD]
        .project_from_scatter(
            bad_stats.count,
            &scatter(graph, sites, &bad, BAD),
            eigenvalue_floor,
        )
        .map_err(|e| (Parameter::BadPrecision, e))?;

    let weights = priors
        .weights
        .with_soft_counts(bad_stats.count, good_stats.count)
        .ok_or((
            Parameter::Weights,
            MathError::NonFinite {
                what: "weight soft counts",
            },
        ))?;

    Ok(ComponentUpdate {
        means: [good, bad],
        precisions: [good_prec, bad_prec],
        weights,
        clipped: good_clipped + bad_clipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dataset, ModelBuilder};
    use npsa_config::Priors;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    fn graph(kpis: Vec<Option<Vec<f64>>>) -> ModelGraph {
        let mut p = Priors::default();
        for (c, m) in [
            (&mut p.components.good, 0.0),
            (&mut p.components.bad, -4.0),
        ] {
            c.mean = vec![m];
            c.mean_precision = vec![1.0];
            c.wishart.scale = vec![1.0];
            c.wishart.shape = 2.0;
        }
        p.weights = npsa_config::priors::BetaParams::new(2.0, 3.0);
        let n = kpis.len();
        let ds = Dataset {
            num_days: 1,
            num_unique_sites: n,
            touched_sites: vec![],
            is_detractor: vec![],
            kpis,
            labels: vec![None; n],
        };
        ModelBuilder::new(p).build(&ds).unwrap()
    }

    #[test]
    fn test_hard_assignments_follow_conjugate_formulas() {
        let g = graph(vec![Some(vec![1.0]), Some(vec![-5.0]), None]);
        let sites = [
            Bernoulli::point_mass(false),
            Bernoulli::point_mass(true),
            Bernoulli::uniform(),
        ];
        let up = update_components(&g, &sites, &g.priors.precisions, 1e-9).unwrap();

        // Weights ignore the missing slot.
        assert!(approx_eq(up.weights.alpha, 3.0, 1e-9));
        assert!(approx_eq(up.weights.beta, 4.0, 1e-9));

        // Good mean: precision 1 + 1 * E[L] (= 2), natural mean 0 + 2 * 1.
        let good = &up.means[GOOD];
        assert!(approx_eq(good.precision()[(0, 0)], 3.0, 1e-9));
        assert!(approx_eq(good.mean()[0], 2.0 / 3.0, 1e-9));

        // Wishart shape grows by half the soft count.
        assert!(approx_eq(up.precisions[GOOD].shape(), 2.5, 1e-9));
        assert!(up.means[BAD].mean()[0] < up.means[GOOD].mean()[0]);
    }

    #[test]
    fn test_ordering_projection_swaps_crossed_means() {
        let mut good = VectorGaussian::diagonal(&[-3.0, 1.0], &[1.0, 1.0]).unwrap();
        let mut bad = VectorGaussian::diagonal(&[2.0, -1.0], &[1.0, 1.0]).unwrap();
        enforce_ordering(&mut good, &mut bad, MAX_ORDERING_PASSES).unwrap();
        for d in 0..2 {
            assert!(bad.mean()[d] < good.mean()[d]);
        }
        // Projection shrinks the constrained variances.
        assert!(good.covariance()[(0, 0)] < 1.0);
        assert!(bad.covariance()[(0, 0)] < 1.0);
    }

    #[test]
    fn test_ordering_is_nearly_a_no_op_when_well_separated() {
        let mut good = VectorGaussian::diagonal(&[10.0], &[100.0]).unwrap();
        let mut bad = VectorGaussian::diagonal(&[-10.0], &[100.0]).unwrap();
        enforce_ordering(&mut good, &mut bad, MAX_ORDERING_PASSES).unwrap();
        assert!(approx_eq(good.mean()[0], 10.0, 1e-9));
        assert!(approx_eq(bad.mean()[0], -10.0, 1e-9));
    }

    #[test]
    fn test_ordering_fails_when_passes_run_out() {
        let mut good = VectorGaussian::diagonal(&[-3.0, 1.0, 0.0], &[1.0, 1.0, 1.0]).unwrap();
        let mut bad = VectorGaussian::diagonal(&[2.0, -1.0, 4.0], &[1.0, 1.0, 1.0]).unwrap();
        let err = enforce_ordering(&mut good, &mut bad, 0).unwrap_err();
        assert_eq!(
            err,
            MathError::ConstraintViolated {
                what: "component ordering",
                count: 2
            }
        );
        // Nothing was projected.
        assert_eq!(good.mean()[0], -3.0);
    }

    #[test]
    fn test_ordering_failure_names_the_parameter() {
        let err = crate::inference::InferenceError::NumericalInstability {
            iteration: 4,
            parameter: Parameter::Ordering,
            source: MathError::ConstraintViolated {
                what: "component ordering",
                count: 1,
            },
        };
        assert_eq!(
            err.to_string(),
            "sweep 4: component ordering update failed: component ordering still violated in 1 dimension(s)"
        );
        let common: npsa_common::Error = err.into();
        assert!(matches!(common, npsa_common::Error::NumericalInstability(_)));
    }
}
