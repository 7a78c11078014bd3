//! Configuration snapshots for run summaries and reproducibility.
//!
//! A snapshot captures the exact configuration a run used so its posteriors
//! can be audited and reproduced later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::resolve::{ConfigPaths, ConfigSource};
use crate::{InferenceSettings, Priors};

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    pub schema_version: String,

    /// SHA-256 hash of the priors JSON content.
    #[serde(default)]
    pub priors_hash: Option<String>,

    #[serde(default)]
    pub priors_path: Option<String>,

    pub priors_source: String,

    /// SHA-256 hash of the inference settings JSON content.
    #[serde(default)]
    pub inference_hash: Option<String>,

    #[serde(default)]
    pub inference_path: Option<String>,

    pub inference_source: String,

    /// Combined hash of all config files (for quick comparison).
    pub combined_hash: String,

    /// Key configuration values for quick reference.
    pub summary: ConfigSummary,
}

/// Summary of key configuration values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub kpi_dimension: usize,
    pub iterations: u32,
    pub stop_on_convergence: bool,
    pub tolerance: f64,
    pub damping: f64,
    /// Prior mean of the bad-site mixing weight.
    pub weights_prior_mean: f64,
    pub missing_site_prior: f64,
    pub label_confidence: f64,
}

impl ConfigSnapshot {
    /// Create a new snapshot from loaded configuration.
    ///
    /// `priors_json` / `inference_json` are the raw file contents, `None`
    /// when the built-in default was used.
    pub fn new(
        priors: &Priors,
        settings: &InferenceSettings,
        paths: &ConfigPaths,
        priors_json: Option<&str>,
        inference_json: Option<&str>,
    ) -> Self {
        let priors_hash = priors_json.map(hash_content);
        let inference_hash = inference_json.map(hash_content);

        let combined = format!(
            "{}:{}",
            priors_hash.as_deref().unwrap_or("none"),
            inference_hash.as_deref().unwrap_or("none")
        );

        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            priors_hash,
            priors_path: paths.priors.as_ref().map(|p| p.display().to_string()),
            priors_source: paths.priors_source.to_string(),
            inference_hash,
            inference_path: paths.inference.as_ref().map(|p| p.display().to_string()),
            inference_source: paths.inference_source.to_string(),
            combined_hash: hash_content(&combined),
            summary: ConfigSummary::from_config(priors, settings),
        }
    }

    /// Create a snapshot with only defaults (no config files loaded).
    pub fn defaults_only() -> Self {
        let paths = ConfigPaths {
            priors_source: ConfigSource::BuiltinDefault,
            inference_source: ConfigSource::BuiltinDefault,
            ..ConfigPaths::default()
        };
        Self::new(
            &Priors::default(),
            &InferenceSettings::default(),
            &paths,
            None,
            None,
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check if this snapshot matches another (same config).
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.combined_hash == other.combined_hash
    }

    /// Short identifier (first 12 chars of the combined hash).
    pub fn short_id(&self) -> &str {
        &self.combined_hash[..12.min(self.combined_hash.len())]
    }
}

impl ConfigSummary {
    pub fn from_config(priors: &Priors, settings: &InferenceSettings) -> Self {
        ConfigSummary {
            kpi_dimension: priors.kpi_dimension(),
            iterations: settings.iterations,
            stop_on_convergence: settings.stop_on_convergence,
            tolerance: settings.tolerance,
            damping: settings.damping,
            weights_prior_mean: priors.weights.mean(),
            missing_site_prior: priors.missing_site_prior,
            label_confidence: priors.label_confidence,
        }
    }
}

/// Hash content with SHA-256 and return hex string.
fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_snapshot() {
        let snapshot = ConfigSnapshot::defaults_only();
        assert_eq!(snapshot.schema_version, crate::CONFIG_SCHEMA_VERSION);
        assert!(snapshot.priors_hash.is_none());
        assert_eq!(snapshot.summary.kpi_dimension, 4);
        assert_eq!(snapshot.priors_source, "builtin default");
    }

    #[test]
    fn test_snapshot_matches_and_short_id() {
        let s1 = ConfigSnapshot::defaults_only();
        let s2 = ConfigSnapshot::defaults_only();
        assert!(s1.matches(&s2));
        assert_eq!(s1.short_id().len(), 12);
    }

    #[test]
    fn test_content_changes_hash() {
        let paths = ConfigPaths::default();
        let p = Priors::default();
        let s = InferenceSettings::default();
        let a = ConfigSnapshot::new(&p, &s, &paths, Some("{\"a\":1}"), None);
        let b = ConfigSnapshot::new(&p, &s, &paths, Some("{\"a\":2}"), None);
        assert!(!a.matches(&b));
        assert_eq!(a.priors_hash.as_ref().map(|h| h.len()), Some(64));
    }

    #[test]
    fn test_snapshot_json_roundtrip() {
        let snapshot = ConfigSnapshot::defaults_only();
        let json = snapshot.to_json().unwrap();
        let restored = ConfigSnapshot::from_json(&json).unwrap();
        assert!(snapshot.matches(&restored));
    }
}
