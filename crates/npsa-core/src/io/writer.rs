//! Result files.
//!
//! Every file is rendered in memory first, staged next to its target and
//! renamed into place only after all staged writes succeed, so a failed
//! run never leaves a mix of old and new outputs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

use npsa_config::ConfigSnapshot;
use npsa_math::Beta;

use crate::inference::{ComponentPosterior, InferenceResult};

pub const SITES_RESULTS: &str = "sites-results.csv";
pub const SITES_GRID: &str = "sites-grid.csv";
pub const CUSTOMER_RESULTS: &str = "customer-results.csv";
pub const GMM_RESULTS: &str = "gmm-results.csv";
pub const WEIGHTS_RESULTS: &str = "weights-results.csv";
pub const SUMMARY: &str = "summary.json";

/// Schema version of summary.json.
pub const SUMMARY_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("grid shape {num_days}x{num_unique_sites} does not match {num_sites} site posteriors")]
    GridShape {
        num_days: usize,
        num_unique_sites: usize,
        num_sites: usize,
    },
}

impl From<WriteError> for npsa_common::Error {
    fn from(err: WriteError) -> Self {
        match err {
            WriteError::Io { source, .. } => npsa_common::Error::Io(source),
            WriteError::Json { source, .. } => npsa_common::Error::Json(source),
            other => npsa_common::Error::ModelStructure(other.to_string()),
        }
    }
}

/// Beta belief with its 95% credible interval.
#[derive(Debug, Clone, Serialize)]
pub struct BetaSummary {
    pub alpha: f64,
    pub beta: f64,
    pub mean: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

impl From<&Beta> for BetaSummary {
    fn from(b: &Beta) -> Self {
        let (ci_low, ci_high) = b.credible_interval(0.95);
        Self {
            alpha: b.alpha,
            beta: b.beta,
            mean: b.mean(),
            ci_low,
            ci_high,
        }
    }
}

/// Contents of summary.json.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<'a> {
    pub schema_version: &'static str,
    pub run_id: &'a str,
    pub generated_at: DateTime<Utc>,
    pub num_days: usize,
    pub num_unique_sites: usize,
    pub num_customers: usize,
    pub iterations: u32,
    pub converged: bool,
    pub max_change: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub precision_repairs: usize,
    pub weights: BetaSummary,
    pub true_detractor_rate: BetaSummary,
    pub false_detractor_rate: BetaSummary,
    pub good_component: &'a ComponentPosterior,
    pub bad_component: &'a ComponentPosterior,
    pub config: &'a ConfigSnapshot,
}

impl<'a> RunSummary<'a> {
    pub fn new(
        run_id: &'a str,
        num_days: usize,
        num_unique_sites: usize,
        result: &'a InferenceResult,
        config: &'a ConfigSnapshot,
    ) -> Self {
        Self {
            schema_version: SUMMARY_SCHEMA_VERSION,
            run_id,
            generated_at: Utc::now(),
            num_days,
            num_unique_sites,
            num_customers: result.customer_posteriors.len(),
            iterations: result.iterations,
            converged: result.converged,
            max_change: result.max_change,
            warning: result.warning.map(|w| w.to_string()),
            precision_repairs: result.precision_repairs,
            weights: (&result.weights).into(),
            true_detractor_rate: (&result.true_detractor_rate).into(),
            false_detractor_rate: (&result.false_detractor_rate).into(),
            good_component: &result.components[crate::model::GOOD],
            bad_component: &result.components[crate::model::BAD],
            config,
        }
    }
}

fn lines<I: IntoIterator<Item = f64>>(values: I) -> String {
    let mut out = String::new();
    for v in values {
        let _ = writeln!(out, "{}", v);
    }
    out
}

fn joined(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// `num_days` rows of `num_unique_sites` comma-separated posteriors.
pub fn render_grid(
    posteriors: &[f64],
    num_days: usize,
    num_unique_sites: usize,
) -> Result<String, WriteError> {
    if num_unique_sites == 0 || num_days.checked_mul(num_unique_sites) != Some(posteriors.len()) {
        return Err(WriteError::GridShape {
            num_days,
            num_unique_sites,
            num_sites: posteriors.len(),
        });
    }
    let mut out = String::new();
    for row in posteriors.chunks(num_unique_sites) {
        let _ = writeln!(out, "{}", joined(row));
    }
    Ok(out)
}

/// One line per component (good, bad): mean vector then flattened
/// covariance.
pub fn render_gmm(components: &[ComponentPosterior; 2]) -> String {
    let mut out = String::new();
    for c in components {
        let mut row = c.mean.clone();
        row.extend_from_slice(&c.covariance);
        let _ = writeln!(out, "{}", joined(&row));
    }
    out
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> WriteError + '_ {
    move |source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn staged_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    path.with_file_name(format!("{}.tmp.{}", name, std::process::id()))
}

fn stage(path: &Path, content: &[u8]) -> Result<PathBuf, WriteError> {
    let tmp = staged_path(path);
    let mut file = std::fs::File::create(&tmp).map_err(io_error(&tmp))?;
    file.write_all(content).map_err(io_error(&tmp))?;
    let _ = file.sync_all();
    Ok(tmp)
}

/// Writes the result files of one run into an output directory.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    out_dir: PathBuf,
}

impl ResultWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Write all result files and return their final paths.
    pub fn write(
        &self,
        summary: &RunSummary<'_>,
        result: &InferenceResult,
    ) -> Result<Vec<PathBuf>, WriteError> {
        std::fs::create_dir_all(&self.out_dir).map_err(io_error(&self.out_dir))?;

        let summary_path = self.out_dir.join(SUMMARY);
        let mut summary_json =
            serde_json::to_vec_pretty(summary).map_err(|source| WriteError::Json {
                path: summary_path.clone(),
                source,
            })?;
        summary_json.push(b'\n');

        let files = [
            (
                self.out_dir.join(SITES_RESULTS),
                lines(result.site_posteriors.iter().copied()).into_bytes(),
            ),
            (
                self.out_dir.join(SITES_GRID),
                render_grid(
                    &result.site_posteriors,
                    summary.num_days,
                    summary.num_unique_sites,
                )?
                .into_bytes(),
            ),
            (
                self.out_dir.join(CUSTOMER_RESULTS),
                lines(result.customer_posteriors.iter().copied()).into_bytes(),
            ),
            (
                self.out_dir.join(GMM_RESULTS),
                render_gmm(&result.components).into_bytes(),
            ),
            (
                self.out_dir.join(WEIGHTS_RESULTS),
                lines([result.weights.mean()]).into_bytes(),
            ),
            (summary_path, summary_json),
        ];

        let mut staged = Vec::with_capacity(files.len());
        for (path, content) in &files {
            match stage(path, content) {
                Ok(tmp) => staged.push((tmp, path.clone())),
                Err(e) => {
                    for (tmp, _) in &staged {
                        let _ = std::fs::remove_file(tmp);
                    }
                    return Err(e);
                }
            }
        }
        for (tmp, path) in &staged {
            std::fs::rename(tmp, path).map_err(io_error(path))?;
        }

        Ok(staged.into_iter().map(|(_, path)| path).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_is_day_major() {
        let grid = render_grid(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 2, 3).unwrap();
        assert_eq!(grid, "0.1,0.2,0.3\n0.4,0.5,0.6\n");
        assert!(render_grid(&[0.1, 0.2, 0.3], 2, 2).is_err());
        assert!(render_grid(&[0.1, 0.2], usize::MAX / 2 + 1, 2).is_err());
    }

    #[test]
    fn test_gmm_rows() {
        let c = |m: f64| ComponentPosterior {
            mean: vec![m],
            covariance: vec![0.5],
            mean_covariance: vec![0.01],
            precision_shape: 3.0,
        };
        assert_eq!(render_gmm(&[c(1.0), c(-2.0)]), "1,0.5\n-2,0.5\n");
    }

    #[test]
    fn test_beta_summary() {
        let s = BetaSummary::from(&Beta::new(2.0, 2.0).unwrap());
        assert_eq!(s.mean, 0.5);
        assert!(s.ci_low < 0.5 && s.ci_high > 0.5);
    }
}
