//! Per-site mixture factor.
//!
//! For an OBSERVED site the factor sends `isBadSite` the variational message
//!
//! ```text
//! E[ln pi] - E[ln(1 - pi)] + E[ln N(x | mu_bad, L_bad)] - E[ln N(x | mu_good, L_good)]
//! ```
//!
//! with
//!
//! ```text
//! E[ln N(x | mu, L)] = 0.5 E[ln |L|] - D/2 ln(2 pi)
//!                      - 0.5 ((x - m)^T E[L] (x - m) + tr(E[L] S))
//! ```
//!
//! where `m, S` are the mean and covariance of `q(mu)`. MISSING sites send
//! the configured site prior instead.

use nalgebra::{DMatrix, DVector};
use npsa_math::linalg::quadratic_form;
use npsa_math::{Beta, VectorGaussian, Wishart};
use std::f64::consts::PI;

use crate::model::{KpiState, ModelGraph, BAD, GOOD};

/// Expected log-density of one component, with every term that does not
/// depend on `x` folded into `constant`.
#[derive(Debug, Clone)]
pub struct ComponentTerms {
    mean: DVector<f64>,
    expected_precision: DMatrix<f64>,
    constant: f64,
}

impl ComponentTerms {
    pub fn new(mean: &VectorGaussian, precision: &Wishart) -> Self {
        let d = mean.dim() as f64;
        let expected_precision = precision.mean().clone();
        let trace = (&expected_precision * mean.covariance()).trace();
        let constant =
            0.5 * precision.expected_log_det() - 0.5 * d * (2.0 * PI).ln() - 0.5 * trace;
        Self {
            mean: mean.mean().clone(),
            expected_precision,
            constant,
        }
    }

    /// `E[ln N(x | mu, L)]` under the current beliefs.
    pub fn expected_log_likelihood(&self, x: &DVector<f64>) -> f64 {
        let diff = x - &self.mean;
        self.constant - 0.5 * quadratic_form(&self.expected_precision, &diff)
    }
}

/// Everything the site step needs, frozen from the previous sweep's
/// component and weight beliefs.
#[derive(Debug, Clone)]
pub struct MixtureTerms {
    prior_log_odds: f64,
    missing_log_odds: f64,
    components: [ComponentTerms; 2],
}

impl MixtureTerms {
    pub fn new(
        graph: &ModelGraph,
        means: &[VectorGaussian; 2],
        precisions: &[Wishart; 2],
        weights: &Beta,
    ) -> Self {
        Self {
            prior_log_odds: weights.expected_log_odds(),
            missing_log_odds: graph.priors.missing_site.log_odds,
            components: [
                ComponentTerms::new(&means[GOOD], &precisions[GOOD]),
                ComponentTerms::new(&means[BAD], &precisions[BAD]),
            ],
        }
    }

    /// Log-odds message from site `s`'s mixture factor into `isBadSite_s`.
    pub fn site_message(&self, graph: &ModelGraph, s: usize) -> f64 {
        match graph.sites[s].kpi {
            KpiState::Missing => self.missing_log_odds,
            KpiState::Observed(row) => {
                let x = graph.kpi(row);
                self.prior_log_odds + self.components[BAD].expected_log_likelihood(x)
                    - self.components[GOOD].expected_log_likelihood(x)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dataset, ModelBuilder};
    use npsa_config::Priors;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    fn graph() -> ModelGraph {
        let mut p = Priors::default();
        p.components.good.mean = vec![0.0];
        p.components.good.mean_precision = vec![1.0];
        p.components.good.wishart.scale = vec![1.0];
        p.components.good.wishart.shape = 2.0;
        p.components.bad.mean = vec![-5.0];
        p.components.bad.mean_precision = vec![1.0];
        p.components.bad.wishart.scale = vec![1.0];
        p.components.bad.wishart.shape = 2.0;
        p.weights = npsa_config::priors::BetaParams::new(1.0, 1.0);
        p.missing_site_prior = 0.3;
        let ds = Dataset {
            num_days: 1,
            num_unique_sites: 3,
            touched_sites: vec![],
            is_detractor: vec![],
            kpis: vec![Some(vec![0.2]), Some(vec![-5.1]), None],
            labels: vec![None; 3],
        };
        ModelBuilder::new(p).build(&ds).unwrap()
    }

    #[test]
    fn test_component_terms_match_expected_quadratic() {
        let g = graph();
        let mean = &g.priors.means[GOOD];
        let prec = &g.priors.precisions[GOOD];
        let terms = ComponentTerms::new(mean, prec);
        let x = DVector::from_vec(vec![1.5]);
        let direct = 0.5 * prec.expected_log_det()
            - 0.5 * (2.0 * PI).ln()
            - 0.5 * mean.expected_quadratic(prec.mean(), &x);
        assert!(approx_eq(terms.expected_log_likelihood(&x), direct, 1e-12));
    }

    #[test]
    fn test_site_messages_point_the_right_way() {
        let g = graph();
        let terms = MixtureTerms::new(
            &g,
            &g.priors.means,
            &g.priors.precisions,
            &g.priors.weights,
        );
        assert!(terms.site_message(&g, 0) < -5.0);
        assert!(terms.site_message(&g, 1) > 5.0);
        let missing = terms.site_message(&g, 2);
        assert!(approx_eq(missing, (0.3f64 / 0.7).ln(), 1e-12));
    }
}
