//! Engine-owned belief state.
//!
//! The engine keeps two tables and swaps them after every sweep: all reads
//! in a sweep come from the previous table, all writes go to the next one.

use npsa_math::{Bernoulli, Beta, VectorGaussian, Wishart};

use super::mixture::MixtureTerms;
use super::noisy_or::or_probability;
use crate::model::ModelGraph;

/// Approximate posterior of every latent variable plus the factor messages
/// needed to form cavities.
#[derive(Debug, Clone, PartialEq)]
pub struct BeliefTable {
    /// `q(isBadSite_s)`.
    pub sites: Vec<Bernoulli>,
    /// Mixture-factor message into each site, in log-odds.
    pub mixture: Vec<f64>,
    /// Noisy-OR message along each customer-site edge, in log-odds.
    pub edges: Vec<f64>,
    /// `P(hadBadSite_c)`.
    pub had_bad: Vec<f64>,
    pub means: [VectorGaussian; 2],
    pub precisions: [Wishart; 2],
    pub weights: Beta,
    pub true_rate: Beta,
    pub false_rate: Beta,
}

impl BeliefTable {
    /// Parameters at their priors, mixture messages evaluated against the
    /// priors and no noisy-OR evidence yet. Fully deterministic.
    pub fn initial(graph: &ModelGraph) -> Self {
        let priors = &graph.priors;
        let terms = MixtureTerms::new(graph, &priors.means, &priors.precisions, &priors.weights);
        let mixture: Vec<f64> = (0..graph.num_sites())
            .map(|s| terms.site_message(graph, s))
            .collect();
        let edges = vec![0.0; graph.touches.num_edges()];
        let sites: Vec<Bernoulli> = (0..graph.num_sites())
            .map(|s| Bernoulli::from_log_odds(site_log_odds(graph, s, &mixture, &edges)))
            .collect();
        let had_bad = (0..graph.num_customers())
            .map(|c| customer_or(graph, c, &sites))
            .collect();

        Self {
            sites,
            mixture,
            edges,
            had_bad,
            means: priors.means.clone(),
            precisions: priors.precisions.clone(),
            weights: priors.weights,
            true_rate: priors.true_detractor_rate,
            false_rate: priors.false_detractor_rate,
        }
    }

    /// Largest change of any belief between two tables.
    ///
    /// Probabilities are compared directly; component beliefs by their
    /// mean vectors and expected precision matrices.
    pub fn max_change(&self, other: &BeliefTable) -> f64 {
        let sites = self
            .sites
            .iter()
            .zip(&other.sites)
            .map(|(a, b)| a.prob_change(b));
        let customers = self
            .had_bad
            .iter()
            .zip(&other.had_bad)
            .map(|(a, b)| (a - b).abs());
        let params = [
            (self.weights.mean() - other.weights.mean()).abs(),
            (self.true_rate.mean() - other.true_rate.mean()).abs(),
            (self.false_rate.mean() - other.false_rate.mean()).abs(),
        ];
        let components = (0..2).flat_map(|k| {
            [
                self.means[k].max_mean_change(&other.means[k]),
                self.precisions[k].max_mean_change(&other.precisions[k]),
            ]
        });

        sites
            .chain(customers)
            .chain(params)
            .chain(components)
            .fold(0.0, f64::max)
    }
}

/// Site log-odds: mixture message + label message + noisy-OR messages.
pub fn site_log_odds(graph: &ModelGraph, s: usize, mixture: &[f64], edges: &[f64]) -> f64 {
    let evidence: f64 = graph.site_edges.edges(s).iter().map(|&e| edges[e]).sum();
    mixture[s] + graph.label_log_odds(s) + evidence
}

/// `1 - prod_{s in touched(c)} (1 - q(isBadSite_s))`.
pub fn customer_or(graph: &ModelGraph, c: usize, sites: &[Bernoulli]) -> f64 {
    let log_q: f64 = graph
        .touches
        .sites(c)
        .iter()
        .map(|&s| sites[s].log_prob_false())
        .sum();
    or_probability(log_q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dataset, ModelBuilder};
    use npsa_config::Priors;

    fn graph() -> ModelGraph {
        let ds = Dataset {
            num_days: 1,
            num_unique_sites: 3,
            touched_sites: vec![vec![0, 1], vec![], vec![2]],
            is_detractor: vec![true, true, false],
            kpis: vec![None, None, None],
            labels: vec![None, Some(true), None],
        };
        ModelBuilder::new(Priors::default()).build(&ds).unwrap()
    }

    #[test]
    fn test_initial_table() {
        let g = graph();
        let t = BeliefTable::initial(&g);
        assert_eq!(t.sites.len(), 3);
        assert_eq!(t.edges.len(), 3);
        assert!((t.sites[0].prob_true() - 0.5).abs() < 1e-12);
        assert!((t.sites[1].prob_true() - 0.99).abs() < 1e-9);
        assert_eq!(t.had_bad[1], 0.0);
        let expected = 1.0 - 0.5 * 0.01;
        assert!((t.had_bad[0] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_max_change_is_zero_for_identical_tables() {
        let g = graph();
        let t = BeliefTable::initial(&g);
        assert_eq!(t.max_change(&t.clone()), 0.0);

        let mut moved = t.clone();
        moved.had_bad[2] += 0.25;
        assert!((t.max_change(&moved) - 0.25).abs() < 1e-12);
    }
}
