//! Inference engine settings (inference.json).

use serde::{Deserialize, Serialize};

use crate::validate::ValidationError;

/// Sweep budget, convergence criterion and numerical guards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub schema_version: String,

    /// Sweep budget.
    pub iterations: u32,

    /// Max belief change below which a sweep counts as converged.
    pub tolerance: f64,

    /// Stop at the first converged sweep instead of running the full budget.
    pub stop_on_convergence: bool,

    /// Weight kept from the previous sweep's site messages, in [0, 1).
    pub damping: f64,

    /// Relative eigenvalue floor for precision repair.
    pub eigenvalue_floor: f64,

    /// Parallel site and customer maps.
    pub parallel: bool,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            iterations: 30,
            tolerance: 1e-6,
            stop_on_convergence: false,
            damping: 0.0,
            eigenvalue_floor: 1e-9,
            parallel: true,
        }
    }
}

impl InferenceSettings {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_run_fixed_budget() {
        let s = InferenceSettings::default();
        assert_eq!(s.iterations, 30);
        assert!(!s.stop_on_convergence);
        assert_eq!(s.damping, 0.0);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s = InferenceSettings::from_str(r#"{"iterations": 5, "damping": 0.25}"#).unwrap();
        assert_eq!(s.iterations, 5);
        assert_eq!(s.damping, 0.25);
        assert_eq!(s.tolerance, 1e-6);
        assert!(s.parallel);
    }
}
