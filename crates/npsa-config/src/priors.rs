//! Prior hyperparameters for the site-quality mixture and detractor rates.
//!
//! Defaults reproduce the reference four-KPI model: a "good" component
//! centred on (-50, -5, -50, -5), a "bad" component on (-100, -10, -100, -10),
//! a near-zero prior bad-site rate, and detractor rates skewed toward
//! "bad sites cause detractors".

use serde::{Deserialize, Serialize};

use crate::validate::ValidationError;

/// Complete priors configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Priors {
    pub schema_version: String,

    #[serde(default)]
    pub description: Option<String>,

    pub components: ComponentPriors,

    /// Probability that a site with a KPI vector is bad.
    pub weights: BetaParams,

    /// P(detractor | touched a bad site).
    pub true_detractor_rate: BetaParams,

    /// P(detractor | no bad site touched).
    pub false_detractor_rate: BetaParams,

    /// Site-quality prior used when a slot has no KPI vector.
    #[serde(default = "default_missing_site_prior")]
    pub missing_site_prior: f64,

    /// Mass the labelled variable places on the supplied label.
    #[serde(default = "default_label_confidence")]
    pub label_confidence: f64,
}

/// Hyperparameters for the two mixture components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentPriors {
    pub good: ComponentParams,
    pub bad: ComponentParams,
}

/// Gaussian prior on a component mean plus Wishart prior on its precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentParams {
    pub mean: Vec<f64>,

    /// Diagonal of the prior precision on the mean.
    pub mean_precision: Vec<f64>,

    pub wishart: WishartParams,
}

/// Wishart(shape, scale) with `E[X] = shape * scale`. `scale` is the
/// diagonal of the scale matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishartParams {
    pub shape: f64,
    pub scale: Vec<f64>,

    #[serde(rename = "_comment", default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Beta distribution parameters: Beta(alpha, beta).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetaParams {
    pub alpha: f64,
    pub beta: f64,

    #[serde(rename = "_comment", default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl BetaParams {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self {
            alpha,
            beta,
            comment: None,
        }
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }
}

fn default_missing_site_prior() -> f64 {
    0.5
}

fn default_label_confidence() -> f64 {
    0.99
}

impl ComponentParams {
    fn isotropic(mean: Vec<f64>, mean_precision: f64, shape: f64) -> Self {
        let d = mean.len();
        Self {
            mean,
            mean_precision: vec![mean_precision; d],
            wishart: WishartParams {
                shape,
                scale: vec![1.0; d],
                comment: None,
            },
        }
    }

    pub fn dimension(&self) -> usize {
        self.mean.len()
    }
}

impl Default for Priors {
    fn default() -> Self {
        Self {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            description: Some("Four-KPI reference model".to_string()),
            components: ComponentPriors {
                good: ComponentParams::isotropic(vec![-50.0, -5.0, -50.0, -5.0], 0.1, 10.0),
                bad: ComponentParams::isotropic(vec![-100.0, -10.0, -100.0, -10.0], 0.1, 10.0),
            },
            weights: BetaParams {
                alpha: 1.0,
                beta: 160_000.0,
                comment: Some("bad sites are rare a priori".to_string()),
            },
            true_detractor_rate: BetaParams::new(5.0, 2.0),
            false_detractor_rate: BetaParams::new(2.0, 5.0),
            missing_site_prior: default_missing_site_prior(),
            label_confidence: default_label_confidence(),
        }
    }
}

impl Priors {
    /// Load priors from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_str(&content)
    }

    /// Parse priors from a JSON string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))
    }

    /// Pretty JSON, as printed by `npsa priors`.
    pub fn to_json_pretty(&self) -> Result<String, ValidationError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ValidationError::ParseError(format!("Serialize failed: {}", e)))
    }

    /// KPI vector dimension implied by the good component.
    pub fn kpi_dimension(&self) -> usize {
        self.components.good.dimension()
    }
}
