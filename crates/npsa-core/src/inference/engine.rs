//! Sweep scheduler.
//!
//! One sweep runs four steps against a frozen snapshot of the previous
//! sweep's beliefs:
//!
//! 1. mixture messages into every site, then fresh site beliefs
//! 2. component means (with the ordering projection), precisions, weight
//! 3. noisy-OR messages along every edge, then the detractor rates
//! 4. site beliefs with the new edge messages, then `P(hadBadSite)`
//!
//! Steps 1, 3 and 4 map independently over sites, customers or edges and
//! run on the rayon pool when `parallel` is set. Reductions (component
//! statistics, rate counts) always run sequentially in index order, so
//! parallel and serial runs give bit-identical results.

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use npsa_config::InferenceSettings;
use npsa_math::{Bernoulli, Beta, MathError};

use super::beliefs::{customer_or, site_log_odds, BeliefTable};
use super::components::{update_components, Parameter};
use super::mixture::MixtureTerms;
use super::noisy_or::{log_prob_good, responsibility, site_message, Emission, RateCounts};
use crate::logging::{event_names, LogContext, Stage};
use crate::model::{ModelGraph, BAD, GOOD};

/// Inference failures. Both abort the run: no partial results are written.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("sweep {iteration}: {parameter} update failed: {source}")]
    NumericalInstability {
        iteration: u32,
        parameter: Parameter,
        #[source]
        source: MathError,
    },

    #[error("sweep {iteration}: non-finite {what}")]
    NonFinite { iteration: u32, what: &'static str },
}

impl From<InferenceError> for npsa_common::Error {
    fn from(err: InferenceError) -> Self {
        npsa_common::Error::NumericalInstability(err.to_string())
    }
}

/// Sweep budget exhausted with beliefs still moving.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConvergenceWarning {
    pub iterations: u32,
    pub max_change: f64,
    pub tolerance: f64,
}

impl std::fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "not converged after {} sweeps: max belief change {:.3e} >= tolerance {:.1e}",
            self.iterations, self.max_change, self.tolerance
        )
    }
}

/// Posterior summary of one mixture component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentPosterior {
    /// Posterior mean of the component mean.
    pub mean: Vec<f64>,
    /// Point covariance `E[precision]^-1`, row-major.
    pub covariance: Vec<f64>,
    /// Covariance of the component-mean belief, row-major.
    pub mean_covariance: Vec<f64>,
    pub precision_shape: f64,
}

impl ComponentPosterior {
    fn from_beliefs(table: &BeliefTable, k: usize) -> Self {
        let mean = &table.means[k];
        Self {
            mean: mean.mean().iter().copied().collect(),
            covariance: row_major(&table.precisions[k].covariance_estimate()),
            mean_covariance: row_major(mean.covariance()),
            precision_shape: table.precisions[k].shape(),
        }
    }
}

fn row_major(m: &nalgebra::DMatrix<f64>) -> Vec<f64> {
    m.transpose().iter().copied().collect()
}

/// Everything a run reports.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceResult {
    /// `P(isBadSite)` per site.
    pub site_posteriors: Vec<f64>,
    /// `P(isLabeledBad)` per site, `None` where no label was given.
    pub label_posteriors: Vec<Option<f64>>,
    /// `P(hadBadSite)` per customer.
    pub customer_posteriors: Vec<f64>,
    /// Indexed good, bad.
    pub components: [ComponentPosterior; 2],
    pub weights: Beta,
    pub true_detractor_rate: Beta,
    pub false_detractor_rate: Beta,
    pub iterations: u32,
    pub converged: bool,
    pub max_change: f64,
    /// Total eigenvalues floored during precision repair.
    pub precision_repairs: usize,
    pub warning: Option<ConvergenceWarning>,
    /// Final belief table, usable as a warm start.
    #[serde(skip)]
    pub beliefs: BeliefTable,
}

impl InferenceResult {
    fn from_beliefs(
        graph: &ModelGraph,
        beliefs: BeliefTable,
        iterations: u32,
        max_change: f64,
        tolerance: f64,
        precision_repairs: usize,
    ) -> Self {
        let converged = max_change < tolerance;
        let site_posteriors: Vec<f64> = beliefs.sites.iter().map(Bernoulli::prob_true).collect();
        let label_posteriors = graph
            .sites
            .iter()
            .zip(&site_posteriors)
            .map(|(spec, &p)| match spec.label {
                crate::model::LabelState::Labeled(_) => Some(p),
                crate::model::LabelState::Unlabeled => None,
            })
            .collect();
        let warning = (!converged).then_some(ConvergenceWarning {
            iterations,
            max_change,
            tolerance,
        });

        Self {
            site_posteriors,
            label_posteriors,
            customer_posteriors: beliefs.had_bad.clone(),
            components: [
                ComponentPosterior::from_beliefs(&beliefs, GOOD),
                ComponentPosterior::from_beliefs(&beliefs, BAD),
            ],
            weights: beliefs.weights,
            true_detractor_rate: beliefs.true_rate,
            false_detractor_rate: beliefs.false_rate,
            iterations,
            converged,
            max_change,
            precision_repairs,
            warning,
            beliefs,
        }
    }
}

/// Fill `out[i] = f(i)`, on the rayon pool when `parallel`.
fn fill<T, F>(parallel: bool, out: &mut [T], f: F)
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    if parallel {
        out.par_iter_mut()
            .enumerate()
            .for_each(|(i, slot)| *slot = f(i));
    } else {
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = f(i);
        }
    }
}

fn damp(new: f64, old: f64, damping: f64) -> f64 {
    if damping == 0.0 {
        new
    } else {
        (1.0 - damping) * new + damping * old
    }
}

fn ensure_finite(values: &[f64], iteration: u32, what: &'static str) -> Result<(), InferenceError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(InferenceError::NonFinite { iteration, what })
    }
}

/// Runs EP/VMP sweeps over a built model.
pub struct InferenceEngine<'g> {
    graph: &'g ModelGraph,
    settings: InferenceSettings,
    ctx: LogContext,
}

impl<'g> InferenceEngine<'g> {
    pub fn new(graph: &'g ModelGraph, settings: &InferenceSettings) -> Self {
        Self {
            graph,
            settings: settings.clone(),
            ctx: LogContext::new(crate::logging::generate_run_id()),
        }
    }

    /// Tag this engine's events with an existing run id.
    pub fn with_log_context(mut self, ctx: LogContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Run from the prior-initialized belief table.
    pub fn run(&self) -> Result<InferenceResult, InferenceError> {
        self.run_from(BeliefTable::initial(self.graph))
    }

    /// Run from a given belief table, e.g. the final table of a previous run.
    pub fn run_from(&self, initial: BeliefTable) -> Result<InferenceResult, InferenceError> {
        let budget = self.settings.iterations.max(1);
        let tolerance = self.settings.tolerance;
        let mut current = initial;
        let mut next = current.clone();
        let mut iterations = 0;
        let mut max_change = f64::INFINITY;
        let mut repairs = 0;

        for iteration in 1..=budget {
            repairs += self.sweep(&current, &mut next, iteration)?;
            max_change = next.max_change(&current);
            std::mem::swap(&mut current, &mut next);
            iterations = iteration;

            crate::log_event!(
                self.ctx,
                DEBUG,
                event_names::INFER_SWEEP,
                Stage::Infer,
                "sweep finished",
                iteration = iteration,
                max_change = max_change
            );
            if max_change < tolerance && self.settings.stop_on_convergence {
                break;
            }
        }

        let result = InferenceResult::from_beliefs(
            self.graph, current, iterations, max_change, tolerance, repairs,
        );
        match &result.warning {
            None => crate::log_event!(
                self.ctx,
                INFO,
                event_names::INFER_CONVERGED,
                Stage::Infer,
                "inference converged",
                iterations = iterations,
                max_change = max_change
            ),
            Some(warning) => crate::log_event!(
                self.ctx,
                WARN,
                event_names::INFER_NOT_CONVERGED,
                Stage::Infer,
                warning.to_string(),
                iterations = iterations,
                max_change = max_change,
                tolerance = tolerance
            ),
        }
        Ok(result)
    }

    /// One full sweep reading `cur` and writing `next`. Returns the number
    /// of eigenvalues floored by the precision repair.
    fn sweep(
        &self,
        cur: &BeliefTable,
        next: &mut BeliefTable,
        iteration: u32,
    ) -> Result<usize, InferenceError> {
        let graph = self.graph;
        let parallel = self.settings.parallel;
        let damping = self.settings.damping;

        // 1. Mixture messages and site beliefs.
        let terms = MixtureTerms::new(graph, &cur.means, &cur.precisions, &cur.weights);
        fill(parallel, &mut next.mixture, |s| {
            damp(terms.site_message(graph, s), cur.mixture[s], damping)
        });
        ensure_finite(&next.mixture, iteration, "mixture message")?;
        let mixture = &next.mixture;
        fill(parallel, &mut next.sites, |s| {
            Bernoulli::from_log_odds(site_log_odds(graph, s, mixture, &cur.edges))
        });

        // 2. Component parameters.
        let update = update_components(
            graph,
            &next.sites,
            &cur.precisions,
            self.settings.eigenvalue_floor,
        )
        .map_err(|(parameter, source)| InferenceError::NumericalInstability {
            iteration,
            parameter,
            source,
        })?;
        if update.clipped > 0 {
            crate::log_event!(
                self.ctx,
                DEBUG,
                event_names::INFER_PRECISION_REPAIRED,
                Stage::Infer,
                "floored precision eigenvalues",
                iteration = iteration,
                clipped = update.clipped
            );
        }
        next.means = update.means;
        next.precisions = update.precisions;
        next.weights = update.weights;

        // 3. Noisy-OR messages and detractor rates.
        let emissions: Vec<Emission> = graph
            .is_detractor
            .iter()
            .map(|&y| Emission::new(y, &cur.true_rate, &cur.false_rate))
            .collect();
        let sites = &next.sites;
        let cavity = |e: usize| sites[graph.touches.site_of(e)].log_odds - cur.edges[e];
        let mut log_q = vec![0.0; graph.num_customers()];
        fill(parallel, &mut log_q, |c| {
            graph.touches.edges(c).map(|e| log_prob_good(cavity(e))).sum()
        });
        fill(parallel, &mut next.edges, |e| {
            let c = graph.touches.customer_of(e);
            let others = log_q[c] - log_prob_good(cavity(e));
            damp(site_message(emissions[c], others), cur.edges[e], damping)
        });
        ensure_finite(&next.edges, iteration, "noisy-OR message")?;

        let mut counts = RateCounts::default();
        for (c, &y) in graph.is_detractor.iter().enumerate() {
            counts.add(y, responsibility(emissions[c], log_q[c]));
        }
        let priors = &graph.priors;
        let (true_rate, false_rate) = counts
            .posteriors(&priors.true_detractor_rate, &priors.false_detractor_rate)
            .ok_or(InferenceError::NonFinite {
                iteration,
                what: "detractor rate counts",
            })?;
        next.true_rate = true_rate;
        next.false_rate = false_rate;

        // 4. Site beliefs with the fresh edge messages, then the OR beliefs.
        let (mixture, edges) = (&next.mixture, &next.edges);
        fill(parallel, &mut next.sites, |s| {
            Bernoulli::from_log_odds(site_log_odds(graph, s, mixture, edges))
        });
        let sites = &next.sites;
        fill(parallel, &mut next.had_bad, |c| customer_or(graph, c, sites));

        Ok(update.clipped)
    }
}

/// Build an engine with default logging context and run it.
pub fn infer(
    graph: &ModelGraph,
    settings: &InferenceSettings,
) -> Result<InferenceResult, InferenceError> {
    InferenceEngine::new(graph, settings).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dataset, ModelBuilder};
    use npsa_config::Priors;

    fn dataset() -> Dataset {
        Dataset {
            num_days: 1,
            num_unique_sites: 3,
            touched_sites: vec![vec![0], vec![0, 1], vec![1], vec![], vec![2, 0]],
            is_detractor: vec![true, true, false, true, false],
            kpis: vec![Some(vec![-3.0]), Some(vec![0.5]), None],
            labels: vec![None, None, Some(false)],
        }
    }

    fn priors() -> Priors {
        let mut p = Priors::default();
        p.components.good.mean = vec![0.0];
        p.components.good.mean_precision = vec![1.0];
        p.components.good.wishart.scale = vec![1.0];
        p.components.bad.mean = vec![-3.0];
        p.components.bad.mean_precision = vec![1.0];
        p.components.bad.wishart.scale = vec![1.0];
        p
    }

    fn settings(parallel: bool) -> InferenceSettings {
        InferenceSettings {
            iterations: 20,
            parallel,
            ..InferenceSettings::default()
        }
    }

    #[test]
    fn test_run_shapes() {
        let g = ModelBuilder::new(priors()).build(&dataset()).unwrap();
        let r = infer(&g, &settings(false)).unwrap();
        assert_eq!(r.site_posteriors.len(), 3);
        assert_eq!(r.customer_posteriors.len(), 5);
        assert_eq!(r.label_posteriors, vec![None, None, Some(r.site_posteriors[2])]);
        assert_eq!(r.iterations, 20);
        assert_eq!(r.customer_posteriors[3], 0.0);
        assert!(r.site_posteriors.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_parallel_matches_serial() {
        let g = ModelBuilder::new(priors()).build(&dataset()).unwrap();
        let serial = infer(&g, &settings(false)).unwrap();
        let parallel = infer(&g, &settings(true)).unwrap();
        assert_eq!(serial.site_posteriors, parallel.site_posteriors);
        assert_eq!(serial.customer_posteriors, parallel.customer_posteriors);
        assert_eq!(serial.beliefs, parallel.beliefs);
    }

    #[test]
    fn test_stop_on_convergence_ends_early() {
        let g = ModelBuilder::new(priors()).build(&dataset()).unwrap();
        let s = InferenceSettings {
            iterations: 500,
            tolerance: 1e-4,
            stop_on_convergence: true,
            ..settings(false)
        };
        let r = infer(&g, &s).unwrap();
        assert!(r.converged);
        assert!(r.warning.is_none());
        assert!(r.iterations < 500);
    }

    #[test]
    fn test_single_sweep_reports_warning() {
        let g = ModelBuilder::new(priors()).build(&dataset()).unwrap();
        let s = InferenceSettings {
            iterations: 1,
            tolerance: 1e-12,
            ..settings(false)
        };
        let r = infer(&g, &s).unwrap();
        assert!(!r.converged);
        let w = r.warning.unwrap();
        assert_eq!(w.iterations, 1);
        assert!(w.to_string().contains("not converged after 1 sweeps"));
    }

    #[test]
    fn test_damped_run_reaches_the_undamped_fixed_point() {
        let g = ModelBuilder::new(priors()).build(&dataset()).unwrap();
        let run = |damping: f64| {
            let s = InferenceSettings {
                iterations: 5000,
                tolerance: 1e-9,
                stop_on_convergence: true,
                damping,
                ..settings(false)
            };
            infer(&g, &s).unwrap()
        };
        let plain = run(0.0);
        let damped = run(0.5);
        assert!(plain.converged);
        assert!(damped.converged, "{:?}", damped.warning);

        for (a, b) in damped.site_posteriors.iter().zip(&plain.site_posteriors) {
            assert!((a - b).abs() < 1e-5, "{} vs {}", a, b);
        }
        for (c, sites) in dataset().touched_sites.iter().enumerate() {
            let mut unique = sites.clone();
            unique.sort_unstable();
            unique.dedup();
            let all_good: f64 = unique
                .iter()
                .map(|&s| 1.0 - damped.site_posteriors[s])
                .product();
            assert!((damped.customer_posteriors[c] - (1.0 - all_good)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_overflowing_kpi_is_numerical_instability() {
        let mut ds = dataset();
        ds.kpis[1] = Some(vec![1e200]);
        let g = ModelBuilder::new(priors()).build(&ds).unwrap();
        let err = infer(&g, &settings(false)).unwrap_err();
        assert!(matches!(
            err,
            InferenceError::NonFinite {
                iteration: 1,
                what: "mixture message"
            }
        ));
        let common: npsa_common::Error = err.into();
        assert_eq!(
            crate::exit_codes::ExitCode::for_error(&common),
            crate::exit_codes::ExitCode::NumericalError
        );
    }

    #[test]
    fn test_damp() {
        assert_eq!(damp(2.0, 4.0, 0.0), 2.0);
        assert!((damp(2.0, 4.0, 0.25) - 2.5).abs() < 1e-12);
    }
}
