//! Text dataset adapters.
//!
//! Four line-oriented files, one record per line:
//!
//! | file           | record                | separator | notes                                  |
//! |----------------|-----------------------|-----------|----------------------------------------|
//! | `interactions` | one customer          | `;`       | site slot indices, empty fields skipped |
//! | `responses`    | one customer          | `\|`      | second field `1` marks a detractor     |
//! | `kpis`         | one site slot         | `;`       | any field `100000` marks KPI-missing   |
//! | `labels`       | one site slot         | `;`       | first field `100000` unlabeled, `1` bad |

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::model::Dataset;

/// Field value marking a missing KPI vector or an absent label.
pub const MISSING_SENTINEL: f64 = 100000.0;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("{path}: expected {expected} {what}, found {actual}")]
    Count {
        path: PathBuf,
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{num_days} days x {num_unique_sites} unique sites overflows the site slot count")]
    SiteCountOverflow {
        num_days: usize,
        num_unique_sites: usize,
    },
}

impl From<DatasetError> for npsa_common::Error {
    fn from(err: DatasetError) -> Self {
        match err {
            DatasetError::Io { source, .. } => npsa_common::Error::Io(source),
            other => npsa_common::Error::Dataset(other.to_string()),
        }
    }
}

/// Input file locations for one run.
#[derive(Debug, Clone)]
pub struct DatasetPaths {
    pub interactions: PathBuf,
    pub responses: PathBuf,
    pub kpis: PathBuf,
    pub labels: Option<PathBuf>,
}

fn read(path: &Path) -> Result<String, DatasetError> {
    std::fs::read_to_string(path).map_err(|e| DatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Lines with trailing blank lines dropped; interior blank lines are kept.
fn records(content: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = content.lines().collect();
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines
}

fn fields(line: &str, sep: char) -> impl Iterator<Item = &str> {
    line.split(sep).map(str::trim).filter(|f| !f.is_empty())
}

fn parse_error(path: &Path, line: usize, message: impl Into<String>) -> DatasetError {
    DatasetError::Parse {
        path: path.to_path_buf(),
        line,
        message: message.into(),
    }
}

fn expect_count(
    path: &Path,
    what: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), DatasetError> {
    if expected == actual {
        Ok(())
    } else {
        Err(DatasetError::Count {
            path: path.to_path_buf(),
            what,
            expected,
            actual,
        })
    }
}

/// Per-customer touched site slots.
///
/// Every line is a customer, blank lines included: a blank line is a
/// customer who touched no sites.
pub fn parse_interactions(path: &Path, content: &str) -> Result<Vec<Vec<usize>>, DatasetError> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| {
            fields(line, ';')
                .map(|f| {
                    f.parse::<usize>()
                        .map_err(|_| parse_error(path, i + 1, format!("invalid site index '{}'", f)))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .collect()
}

/// Per-customer detractor flags.
pub fn parse_responses(path: &Path, content: &str) -> Result<Vec<bool>, DatasetError> {
    records(content)
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let values = line
                .split('|')
                .map(|f| {
                    f.trim().parse::<i64>().map_err(|_| {
                        parse_error(path, i + 1, format!("invalid response field '{}'", f.trim()))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            match values.get(1) {
                Some(&flag) => Ok(flag == 1),
                None => Err(parse_error(path, i + 1, "expected at least 2 fields")),
            }
        })
        .collect()
}

/// Per-slot KPI vectors; `None` where any field carries the sentinel.
pub fn parse_kpis(
    path: &Path,
    content: &str,
    num_sites: usize,
) -> Result<Vec<Option<Vec<f64>>>, DatasetError> {
    let lines = records(content);
    expect_count(path, "site slot lines", num_sites, lines.len())?;
    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let values = fields(line, ';')
                .map(|f| {
                    f.parse::<f64>()
                        .map_err(|_| parse_error(path, i + 1, format!("invalid KPI value '{}'", f)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            if values.is_empty() {
                return Err(parse_error(path, i + 1, "empty KPI record"));
            }
            if values.iter().any(|&v| v == MISSING_SENTINEL) {
                Ok(None)
            } else {
                Ok(Some(values))
            }
        })
        .collect()
}

/// Per-slot labels; `None` for unlabeled slots.
pub fn parse_labels(
    path: &Path,
    content: &str,
    num_sites: usize,
) -> Result<Vec<Option<bool>>, DatasetError> {
    let lines = records(content);
    expect_count(path, "site slot lines", num_sites, lines.len())?;
    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let first = fields(line, ';')
                .next()
                .ok_or_else(|| parse_error(path, i + 1, "empty label record"))?;
            let value = first
                .parse::<f64>()
                .map_err(|_| parse_error(path, i + 1, format!("invalid label '{}'", first)))?;
            Ok(if value == MISSING_SENTINEL {
                None
            } else {
                Some(value == 1.0)
            })
        })
        .collect()
}

/// Read and cross-check all input files.
///
/// Structural checks against the model (index range, KPI dimension) are
/// left to the model builder.
pub fn load_dataset(
    paths: &DatasetPaths,
    num_days: usize,
    num_unique_sites: usize,
) -> Result<Dataset, DatasetError> {
    let num_sites =
        num_days
            .checked_mul(num_unique_sites)
            .ok_or(DatasetError::SiteCountOverflow {
                num_days,
                num_unique_sites,
            })?;

    let touched_sites = parse_interactions(&paths.interactions, &read(&paths.interactions)?)?;
    let is_detractor = parse_responses(&paths.responses, &read(&paths.responses)?)?;
    expect_count(
        &paths.responses,
        "customer lines",
        touched_sites.len(),
        is_detractor.len(),
    )?;
    let kpis = parse_kpis(&paths.kpis, &read(&paths.kpis)?, num_sites)?;
    let labels = match &paths.labels {
        Some(path) => parse_labels(path, &read(path)?, num_sites)?,
        None => vec![None; num_sites],
    };

    let dataset = Dataset {
        num_days,
        num_unique_sites,
        touched_sites,
        is_detractor,
        kpis,
        labels,
    };
    debug!(
        num_customers = dataset.num_customers(),
        num_sites = dataset.num_sites(),
        max_site_index = ?dataset.max_site_index(),
        num_labeled = dataset.num_labeled(),
        num_missing = dataset.num_missing(),
        "dataset loaded"
    );
    Ok(dataset)
}
