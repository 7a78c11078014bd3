//! The fixed factor graph: site states, customer touch lists and priors.
//!
//! Everything here is immutable once built. Beliefs live in the inference
//! engine's belief table, never on the graph.

use nalgebra::DVector;
use npsa_math::{Bernoulli, Beta, VectorGaussian, Wishart};
use std::ops::Range;

/// Ragged per-customer site lists stored as one flat index array plus
/// offsets. Customer `c` owns `indices[offsets[c]..offsets[c + 1]]`; the
/// position inside `indices` is the edge id used for noisy-OR messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchArena {
    offsets: Vec<usize>,
    indices: Vec<usize>,
    /// Customer owning each edge.
    owners: Vec<usize>,
}

impl TouchArena {
    /// Build from per-customer lists. Repeated sites within one list are
    /// collapsed, keeping the first occurrence.
    pub fn from_lists<L: AsRef<[usize]>>(lists: &[L]) -> Self {
        let mut offsets = Vec::with_capacity(lists.len() + 1);
        let capacity = lists.iter().map(|l| l.as_ref().len()).sum();
        let mut indices = Vec::with_capacity(capacity);
        let mut owners = Vec::with_capacity(capacity);
        offsets.push(0);
        for (customer, list) in lists.iter().enumerate() {
            let start = indices.len();
            for &site in list.as_ref() {
                if !indices[start..].contains(&site) {
                    indices.push(site);
                    owners.push(customer);
                }
            }
            offsets.push(indices.len());
        }
        Self {
            offsets,
            indices,
            owners,
        }
    }

    pub fn num_customers(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Total number of customer-site edges.
    pub fn num_edges(&self) -> usize {
        self.indices.len()
    }

    /// Edge ids owned by customer `c`.
    pub fn edges(&self, c: usize) -> Range<usize> {
        self.offsets[c]..self.offsets[c + 1]
    }

    /// Sites touched by customer `c`.
    pub fn sites(&self, c: usize) -> &[usize] {
        &self.indices[self.edges(c)]
    }

    /// Site at the far end of edge `e`.
    pub fn site_of(&self, e: usize) -> usize {
        self.indices[e]
    }

    pub fn customer_of(&self, e: usize) -> usize {
        self.owners[e]
    }

    /// Reverse index: for each site, the edge ids that reach it, in
    /// ascending order.
    pub fn site_edges(&self, num_sites: usize) -> SiteEdges {
        let mut counts = vec![0usize; num_sites + 1];
        for &s in &self.indices {
            counts[s + 1] += 1;
        }
        for i in 1..counts.len() {
            counts[i] += counts[i - 1];
        }
        let offsets = counts.clone();
        let mut cursor = counts;
        let mut edges = vec![0usize; self.indices.len()];
        for (e, &s) in self.indices.iter().enumerate() {
            edges[cursor[s]] = e;
            cursor[s] += 1;
        }
        SiteEdges { offsets, edges }
    }
}

/// Site-major view of the touch arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteEdges {
    offsets: Vec<usize>,
    edges: Vec<usize>,
}

impl SiteEdges {
    pub fn edges(&self, s: usize) -> &[usize] {
        &self.edges[self.offsets[s]..self.offsets[s + 1]]
    }
}

/// Whether a site contributes a KPI vector to the mixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KpiState {
    Missing,
    /// Row into [`ModelGraph::kpi`].
    Observed(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelState {
    Unlabeled,
    /// `true` = labelled bad.
    Labeled(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteSpec {
    pub kpi: KpiState,
    pub label: LabelState,
}

/// Mixture component index.
pub const GOOD: usize = 0;
pub const BAD: usize = 1;

/// Priors converted to distribution objects.
#[derive(Debug, Clone)]
pub struct ModelPriors {
    /// `mean_k` priors, indexed by [`GOOD`] / [`BAD`].
    pub means: [VectorGaussian; 2],
    /// `precision_k` priors.
    pub precisions: [Wishart; 2],
    pub weights: Beta,
    pub true_detractor_rate: Beta,
    pub false_detractor_rate: Beta,
    /// Site-quality prior used for KPI-missing slots.
    pub missing_site: Bernoulli,
    /// Message a label sends into `isBadSite` through the equality factor,
    /// for a label of `true`.
    pub label_message: Bernoulli,
}

/// The wired model.
#[derive(Debug, Clone)]
pub struct ModelGraph {
    pub num_days: usize,
    pub num_unique_sites: usize,
    pub kpi_dimension: usize,
    pub priors: ModelPriors,
    pub sites: Vec<SiteSpec>,
    /// Observed KPI vectors, indexed by [`KpiState::Observed`] rows.
    pub kpis: Vec<DVector<f64>>,
    /// Site id of each KPI row.
    pub observed_sites: Vec<usize>,
    pub touches: TouchArena,
    pub site_edges: SiteEdges,
    pub is_detractor: Vec<bool>,
}

impl ModelGraph {
    pub fn num_sites(&self) -> usize {
        self.sites.len()
    }

    pub fn num_customers(&self) -> usize {
        self.is_detractor.len()
    }

    pub fn kpi(&self, row: usize) -> &DVector<f64> {
        &self.kpis[row]
    }

    /// Constant log-odds message from the label variable, 0 when unlabeled.
    pub fn label_log_odds(&self, s: usize) -> f64 {
        match self.sites[s].label {
            LabelState::Unlabeled => 0.0,
            LabelState::Labeled(true) => self.priors.label_message.log_odds,
            LabelState::Labeled(false) => -self.priors.label_message.log_odds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_layout() {
        let arena = TouchArena::from_lists(&[vec![2usize, 0], vec![], vec![1, 2, 1]]);
        assert_eq!(arena.num_customers(), 3);
        assert_eq!(arena.num_edges(), 4);
        assert_eq!(arena.sites(0), &[2, 0]);
        assert!(arena.sites(1).is_empty());
        assert_eq!(arena.sites(2), &[1, 2]);
        assert_eq!(arena.edges(2), 2..4);
        assert_eq!(arena.site_of(3), 2);
        assert_eq!(arena.customer_of(0), 0);
        assert_eq!(arena.customer_of(3), 2);
    }

    #[test]
    fn test_site_edges_reverse_index() {
        let arena = TouchArena::from_lists(&[vec![2usize, 0], vec![2], vec![1, 2]]);
        let rev = arena.site_edges(4);
        assert_eq!(rev.edges(0), &[1]);
        assert_eq!(rev.edges(1), &[3]);
        assert_eq!(rev.edges(2), &[0, 2, 4]);
        assert!(rev.edges(3).is_empty());
    }
}
