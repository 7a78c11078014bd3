//! Model builder: validates a dataset against the priors and wires the
//! fixed factor graph.

use nalgebra::DVector;
use npsa_config::priors::{BetaParams, ComponentParams};
use npsa_config::Priors;
use npsa_math::{Bernoulli, Beta, MathError, VectorGaussian, Wishart};
use thiserror::Error;
use tracing::debug;

use super::dataset::Dataset;
use super::graph::{KpiState, LabelState, ModelGraph, ModelPriors, SiteSpec, TouchArena};

/// Structural problems detected before any sweep runs.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("customer {customer} touches site {site}, but only {num_sites} site slots exist")]
    SiteIndexOutOfRange {
        customer: usize,
        site: usize,
        num_sites: usize,
    },

    #[error("site {site} has {actual} KPI values, expected {expected}")]
    KpiDimensionMismatch {
        site: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{actual} site slots supplied, but num_days * num_unique_sites = {declared}")]
    SiteCountMismatch { declared: usize, actual: usize },

    #[error("{num_days} days x {num_unique_sites} unique sites overflows the site slot count")]
    SiteCountOverflow {
        num_days: usize,
        num_unique_sites: usize,
    },

    #[error("{what} has {actual} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("site {site} has a non-finite KPI value")]
    NonFiniteKpi { site: usize },

    #[error("invalid prior for {what}: {source}")]
    InvalidPrior {
        what: &'static str,
        #[source]
        source: MathError,
    },
}

impl From<ModelError> for npsa_common::Error {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::InvalidPrior { .. } => npsa_common::Error::InvalidPriors(err.to_string()),
            _ => npsa_common::Error::ModelStructure(err.to_string()),
        }
    }
}

/// Builds a [`ModelGraph`] from priors and a dataset.
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    priors: Priors,
}

impl ModelBuilder {
    pub fn new(priors: Priors) -> Self {
        Self { priors }
    }

    pub fn build(&self, dataset: &Dataset) -> Result<ModelGraph, ModelError> {
        let num_sites = dataset.num_sites();
        let declared = dataset
            .declared_sites()
            .ok_or(ModelError::SiteCountOverflow {
                num_days: dataset.num_days,
                num_unique_sites: dataset.num_unique_sites,
            })?;
        if num_sites != declared {
            return Err(ModelError::SiteCountMismatch {
                declared,
                actual: num_sites,
            });
        }
        if dataset.labels.len() != num_sites {
            return Err(ModelError::LengthMismatch {
                what: "labels",
                expected: num_sites,
                actual: dataset.labels.len(),
            });
        }
        if dataset.is_detractor.len() != dataset.num_customers() {
            return Err(ModelError::LengthMismatch {
                what: "responses",
                expected: dataset.num_customers(),
                actual: dataset.is_detractor.len(),
            });
        }

        for (customer, sites) in dataset.touched_sites.iter().enumerate() {
            if let Some(&site) = sites.iter().find(|&&s| s >= num_sites) {
                return Err(ModelError::SiteIndexOutOfRange {
                    customer,
                    site,
                    num_sites,
                });
            }
        }

        let dim = self.priors.kpi_dimension();
        let mut sites = Vec::with_capacity(num_sites);
        let mut kpis = Vec::new();
        let mut observed_sites = Vec::new();
        for (site, (kpi, label)) in dataset.kpis.iter().zip(&dataset.labels).enumerate() {
            let kpi = match kpi {
                None => KpiState::Missing,
                Some(values) => {
                    if values.len() != dim {
                        return Err(ModelError::KpiDimensionMismatch {
                            site,
                            expected: dim,
                            actual: values.len(),
                        });
                    }
                    if values.iter().any(|v| !v.is_finite()) {
                        return Err(ModelError::NonFiniteKpi { site });
                    }
                    kpis.push(DVector::from_column_slice(values));
                    observed_sites.push(site);
                    KpiState::Observed(kpis.len() - 1)
                }
            };
            let label = match label {
                None => LabelState::Unlabeled,
                Some(bad) => LabelState::Labeled(*bad),
            };
            sites.push(SiteSpec { kpi, label });
        }

        let touches = TouchArena::from_lists(&dataset.touched_sites);
        let site_edges = touches.site_edges(num_sites);

        debug!(
            num_sites,
            num_customers = dataset.num_customers(),
            num_edges = touches.num_edges(),
            observed = kpis.len(),
            "factor graph wired"
        );

        Ok(ModelGraph {
            num_days: dataset.num_days,
            num_unique_sites: dataset.num_unique_sites,
            kpi_dimension: dim,
            priors: self.model_priors()?,
            sites,
            kpis,
            observed_sites,
            touches,
            site_edges,
            is_detractor: dataset.is_detractor.clone(),
        })
    }

    fn model_priors(&self) -> Result<ModelPriors, ModelError> {
        let p = &self.priors;
        Ok(ModelPriors {
            means: [
                mean_prior("components.good.mean", &p.components.good)?,
                mean_prior("components.bad.mean", &p.components.bad)?,
            ],
            precisions: [
                precision_prior("components.good.wishart", &p.components.good)?,
                precision_prior("components.bad.wishart", &p.components.bad)?,
            ],
            weights: beta_prior("weights", &p.weights)?,
            true_detractor_rate: beta_prior("true_detractor_rate", &p.true_detractor_rate)?,
            false_detractor_rate: beta_prior("false_detractor_rate", &p.false_detractor_rate)?,
            missing_site: Bernoulli::from_prob(open_probability(
                "missing_site_prior",
                p.missing_site_prior,
            )?),
            label_message: Bernoulli::from_prob(open_probability(
                "label_confidence",
                p.label_confidence,
            )?),
        })
    }
}

fn mean_prior(what: &'static str, c: &ComponentParams) -> Result<VectorGaussian, ModelError> {
    VectorGaussian::diagonal(&c.mean, &c.mean_precision)
        .map_err(|source| ModelError::InvalidPrior { what, source })
}

fn precision_prior(what: &'static str, c: &ComponentParams) -> Result<Wishart, ModelError> {
    Wishart::diagonal(c.wishart.shape, &c.wishart.scale)
        .map_err(|source| ModelError::InvalidPrior { what, source })
}

fn beta_prior(what: &'static str, b: &BetaParams) -> Result<Beta, ModelError> {
    Beta::new(b.alpha, b.beta).ok_or(ModelError::InvalidPrior {
        what,
        source: MathError::InvalidParameter {
            name: "beta parameters",
            value: if b.alpha > 0.0 { b.beta } else { b.alpha },
        },
    })
}

fn open_probability(what: &'static str, p: f64) -> Result<f64, ModelError> {
    if p > 0.0 && p < 1.0 {
        Ok(p)
    } else {
        Err(ModelError::InvalidPrior {
            what,
            source: MathError::InvalidParameter {
                name: "probability",
                value: p,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::graph::{BAD, GOOD};

    fn priors_2d() -> Priors {
        let mut p = Priors::default();
        for (c, m) in [
            (&mut p.components.good, [0.0, 0.0]),
            (&mut p.components.bad, [-10.0, -10.0]),
        ] {
            c.mean = m.to_vec();
            c.mean_precision = vec![0.1; 2];
            c.wishart.scale = vec![1.0; 2];
        }
        p
    }

    fn dataset() -> Dataset {
        Dataset {
            num_days: 1,
            num_unique_sites: 3,
            touched_sites: vec![vec![0, 2, 0], vec![]],
            is_detractor: vec![true, false],
            kpis: vec![Some(vec![0.5, 0.1]), None, Some(vec![-9.0, -11.0])],
            labels: vec![None, Some(true), None],
        }
    }

    #[test]
    fn test_build_wires_states() {
        let graph = ModelBuilder::new(priors_2d()).build(&dataset()).unwrap();
        assert_eq!(graph.num_sites(), 3);
        assert_eq!(graph.num_customers(), 2);
        assert_eq!(graph.kpi_dimension, 2);
        assert_eq!(graph.sites[0].kpi, KpiState::Observed(0));
        assert_eq!(graph.sites[1].kpi, KpiState::Missing);
        assert_eq!(graph.sites[1].label, LabelState::Labeled(true));
        assert_eq!(graph.sites[2].kpi, KpiState::Observed(1));
        assert_eq!(graph.observed_sites, vec![0, 2]);
        assert_eq!(graph.touches.sites(0), &[0, 2]);
        assert!(graph.touches.sites(1).is_empty());
        assert_eq!(graph.priors.means[GOOD].mean()[0], 0.0);
        assert_eq!(graph.priors.means[BAD].mean()[1], -10.0);
        assert!(graph.label_log_odds(1) > 4.0);
        assert_eq!(graph.label_log_odds(0), 0.0);
    }

    #[test]
    fn test_out_of_range_site() {
        let mut ds = dataset();
        ds.touched_sites[1] = vec![1, 3];
        let err = ModelBuilder::new(priors_2d()).build(&ds).unwrap_err();
        assert_eq!(
            err,
            ModelError::SiteIndexOutOfRange {
                customer: 1,
                site: 3,
                num_sites: 3
            }
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut ds = dataset();
        ds.kpis[2] = Some(vec![1.0, 2.0, 3.0]);
        let err = ModelBuilder::new(priors_2d()).build(&ds).unwrap_err();
        assert!(matches!(
            err,
            ModelError::KpiDimensionMismatch {
                site: 2,
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_site_count_mismatch() {
        let mut ds = dataset();
        ds.num_days = 2;
        let err = ModelBuilder::new(priors_2d()).build(&ds).unwrap_err();
        assert_eq!(
            err,
            ModelError::SiteCountMismatch {
                declared: 6,
                actual: 3
            }
        );
        let common: npsa_common::Error = err.into();
        assert_eq!(common.code(), 21);
    }

    #[test]
    fn test_site_count_overflow() {
        let mut ds = dataset();
        ds.num_days = usize::MAX / 2 + 1;
        ds.num_unique_sites = 2;
        let err = ModelBuilder::new(priors_2d()).build(&ds).unwrap_err();
        assert!(matches!(err, ModelError::SiteCountOverflow { .. }));
        let common: npsa_common::Error = err.into();
        assert_eq!(common.code(), 21);
    }

    #[test]
    fn test_length_mismatches() {
        let mut ds = dataset();
        ds.labels.pop();
        assert!(matches!(
            ModelBuilder::new(priors_2d()).build(&ds),
            Err(ModelError::LengthMismatch { what: "labels", .. })
        ));

        let mut ds = dataset();
        ds.is_detractor.push(true);
        assert!(matches!(
            ModelBuilder::new(priors_2d()).build(&ds),
            Err(ModelError::LengthMismatch {
                what: "responses",
                ..
            })
        ));
    }

    #[test]
    fn test_non_finite_kpi() {
        let mut ds = dataset();
        ds.kpis[0] = Some(vec![f64::NAN, 0.0]);
        assert_eq!(
            ModelBuilder::new(priors_2d()).build(&ds).unwrap_err(),
            ModelError::NonFiniteKpi { site: 0 }
        );
    }

    #[test]
    fn test_invalid_prior_surfaces() {
        let mut p = priors_2d();
        p.weights.alpha = 0.0;
        let err = ModelBuilder::new(p).build(&dataset()).unwrap_err();
        assert!(matches!(err, ModelError::InvalidPrior { what: "weights", .. }));
    }
}
