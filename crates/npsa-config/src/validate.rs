//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::priors::{BetaParams, ComponentParams, Priors};
use crate::settings::InferenceSettings;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SemanticError(_) => 63,
            ValidationError::MissingField(_) => 64,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

fn check_version(actual: &str) -> ValidationResult<()> {
    if actual != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

/// Validate priors configuration semantically.
pub fn validate_priors(priors: &Priors) -> ValidationResult<()> {
    check_version(&priors.schema_version)?;

    let dim = priors.kpi_dimension();
    if dim == 0 {
        return Err(ValidationError::MissingField(
            "components.good.mean".to_string(),
        ));
    }

    validate_component("components.good", &priors.components.good, dim)?;
    validate_component("components.bad", &priors.components.bad, dim)?;

    validate_beta_params("weights", &priors.weights)?;
    validate_beta_params("true_detractor_rate", &priors.true_detractor_rate)?;
    validate_beta_params("false_detractor_rate", &priors.false_detractor_rate)?;

    validate_open_probability("missing_site_prior", priors.missing_site_prior)?;
    validate_open_probability("label_confidence", priors.label_confidence)?;

    Ok(())
}

fn validate_component(name: &str, params: &ComponentParams, dim: usize) -> ValidationResult<()> {
    for (field, len) in [
        ("mean", params.mean.len()),
        ("mean_precision", params.mean_precision.len()),
        ("wishart.scale", params.wishart.scale.len()),
    ] {
        if len != dim {
            return Err(ValidationError::SemanticError(format!(
                "{}.{} has {} entries but the KPI dimension is {}",
                name, field, len, dim
            )));
        }
    }

    if let Some(v) = params.mean.iter().find(|v| !v.is_finite()) {
        return Err(ValidationError::InvalidValue {
            field: format!("{}.mean", name),
            message: format!("Must be finite, got {}", v),
        });
    }
    validate_positive_all(&format!("{}.mean_precision", name), &params.mean_precision)?;
    validate_positive_all(&format!("{}.wishart.scale", name), &params.wishart.scale)?;

    let min_shape = (dim as f64 - 1.0) / 2.0;
    if !params.wishart.shape.is_finite() || params.wishart.shape <= min_shape {
        return Err(ValidationError::InvalidValue {
            field: format!("{}.wishart.shape", name),
            message: format!(
                "Must exceed (d-1)/2 = {} for dimension {}, got {}",
                min_shape, dim, params.wishart.shape
            ),
        });
    }

    Ok(())
}

fn validate_positive_all(field: &str, values: &[f64]) -> ValidationResult<()> {
    if let Some(v) = values.iter().find(|v| !v.is_finite() || **v <= 0.0) {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("Must be positive and finite, got {}", v),
        });
    }
    Ok(())
}

/// Validate Beta distribution parameters.
fn validate_beta_params(field: &str, params: &BetaParams) -> ValidationResult<()> {
    if !params.alpha.is_finite() || params.alpha <= 0.0 {
        return Err(ValidationError::InvalidValue {
            field: format!("{}.alpha", field),
            message: format!("Must be positive, got {}", params.alpha),
        });
    }

    if !params.beta.is_finite() || params.beta <= 0.0 {
        return Err(ValidationError::InvalidValue {
            field: format!("{}.beta", field),
            message: format!("Must be positive, got {}", params.beta),
        });
    }

    Ok(())
}

fn validate_open_probability(field: &str, p: f64) -> ValidationResult<()> {
    if !(p > 0.0 && p < 1.0) {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("Must be in (0, 1), got {}", p),
        });
    }
    Ok(())
}

/// Validate inference settings.
pub fn validate_settings(settings: &InferenceSettings) -> ValidationResult<()> {
    check_version(&settings.schema_version)?;

    if settings.iterations == 0 {
        return Err(ValidationError::InvalidValue {
            field: "iterations".to_string(),
            message: "Must be at least 1".to_string(),
        });
    }

    if !settings.tolerance.is_finite() || settings.tolerance <= 0.0 {
        return Err(ValidationError::InvalidValue {
            field: "tolerance".to_string(),
            message: format!("Must be positive, got {}", settings.tolerance),
        });
    }

    if !(0.0..1.0).contains(&settings.damping) {
        return Err(ValidationError::InvalidValue {
            field: "damping".to_string(),
            message: format!("Must be in [0, 1), got {}", settings.damping),
        });
    }

    if !(settings.eigenvalue_floor > 0.0 && settings.eigenvalue_floor < 1.0) {
        return Err(ValidationError::InvalidValue {
            field: "eigenvalue_floor".to_string(),
            message: format!("Must be in (0, 1), got {}", settings.eigenvalue_floor),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beta_validation() {
        assert!(validate_beta_params("test", &BetaParams::new(2.0, 5.0)).is_ok());
        assert!(validate_beta_params("test", &BetaParams::new(-1.0, 5.0)).is_err());
        assert!(validate_beta_params("test", &BetaParams::new(1.0, f64::NAN)).is_err());
    }

    #[test]
    fn test_default_priors_valid() {
        validate_priors(&Priors::default()).unwrap();
        validate_settings(&InferenceSettings::default()).unwrap();
    }

    #[test]
    fn test_dimension_mismatch_is_semantic() {
        let mut p = Priors::default();
        p.components.bad.mean.pop();
        let err = validate_priors(&p).unwrap_err();
        assert!(matches!(err, ValidationError::SemanticError(_)));
        assert_eq!(err.code(), 63);
    }

    #[test]
    fn test_wishart_shape_bound() {
        let mut p = Priors::default();
        p.components.good.wishart.shape = 1.5; // d = 4 needs > 1.5
        assert!(matches!(
            validate_priors(&p),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_probability_bounds() {
        let mut p = Priors::default();
        p.missing_site_prior = 1.0;
        assert!(validate_priors(&p).is_err());
    }

    #[test]
    fn test_settings_bounds() {
        let mut s = InferenceSettings::default();
        s.damping = 1.0;
        assert!(validate_settings(&s).is_err());
        s.damping = 0.5;
        s.iterations = 0;
        assert!(validate_settings(&s).is_err());
        s.iterations = 1;
        s.tolerance = 0.0;
        assert!(validate_settings(&s).is_err());
    }

    #[test]
    fn test_version_mismatch() {
        let mut s = InferenceSettings::default();
        s.schema_version = "0.9.0".to_string();
        assert_eq!(validate_settings(&s).unwrap_err().code(), 66);
    }
}
