//! In-memory dataset consumed by the model builder.

use serde::Serialize;

/// Parsed observations for one run.
///
/// Site slots are ordered row-major by day then unique site, so slot
/// `day * num_unique_sites + site` holds that site's KPIs on that day.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    pub num_days: usize,
    pub num_unique_sites: usize,
    /// Site slot indices touched by each customer (0-based).
    pub touched_sites: Vec<Vec<usize>>,
    /// Observed detractor flag per customer.
    pub is_detractor: Vec<bool>,
    /// KPI vector per site slot; `None` marks the slot KPI-missing.
    pub kpis: Vec<Option<Vec<f64>>>,
    /// Optional ground-truth label per site slot (`true` = bad).
    pub labels: Vec<Option<bool>>,
}

impl Dataset {
    /// `num_days * num_unique_sites`, or `None` if the product overflows.
    pub fn declared_sites(&self) -> Option<usize> {
        self.num_days.checked_mul(self.num_unique_sites)
    }

    pub fn num_sites(&self) -> usize {
        self.kpis.len()
    }

    pub fn num_customers(&self) -> usize {
        self.touched_sites.len()
    }

    pub fn num_missing(&self) -> usize {
        self.kpis.iter().filter(|k| k.is_none()).count()
    }

    pub fn num_labeled(&self) -> usize {
        self.labels.iter().filter(|l| l.is_some()).count()
    }

    /// Largest site index referenced by any customer.
    pub fn max_site_index(&self) -> Option<usize> {
        self.touched_sites.iter().flatten().copied().max()
    }
}
