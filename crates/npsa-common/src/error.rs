//! Error types for NPS detractor attribution.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Invalid Input Data
//!   Reason: dataset error: kpis.csv line 17: expected 4 fields, found 3
//!   Fix: Check the input files: one line per site slot (KPIs, labels) ...
//! ```
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 20,
//!   "category": "data",
//!   "message": "dataset error: kpis.csv line 17: expected 4 fields, found 3",
//!   "recoverable": true,
//!   "suggested_action": "fix_input"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for npsa operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Priors and inference settings.
    Config,
    /// Input files and model structure (indices, dimensions, counts).
    Data,
    /// Message passing and numerical errors.
    Inference,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Data => write!(f, "data"),
            ErrorCategory::Inference => write!(f, "inference"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Suggested actions for agents to take in response to errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Run `npsa check` against the configuration.
    RunCheck,
    /// Reset configuration to defaults.
    ResetConfig,
    /// Correct the input files.
    FixInput,
    /// Change inference settings (damping, priors) and rerun.
    AdjustSettings,
    /// Retry the operation.
    Retry,
    /// Manual intervention required.
    ManualIntervention,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::RunCheck => write!(f, "run_check"),
            SuggestedAction::ResetConfig => write!(f, "reset_config"),
            SuggestedAction::FixInput => write!(f, "fix_input"),
            SuggestedAction::AdjustSettings => write!(f, "adjust_settings"),
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::ManualIntervention => write!(f, "manual_intervention"),
        }
    }
}

/// Unified error type for the `npsa` binary.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid priors file: {0}")]
    InvalidPriors(String),

    #[error("invalid inference settings: {0}")]
    InvalidSettings(String),

    // Data errors (20-29)
    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("model structure error: {0}")]
    ModelStructure(String),

    // Inference errors (30-39)
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("numerical instability detected: {0}")]
    NumericalInstability(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Data errors
    /// - 30-39: Inference errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidPriors(_) => 11,
            Error::InvalidSettings(_) => 12,
            Error::Dataset(_) => 20,
            Error::ModelStructure(_) => 21,
            Error::Inference(_) => 30,
            Error::NumericalInstability(_) => 31,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidPriors(_) | Error::InvalidSettings(_) => {
                ErrorCategory::Config
            }
            Error::Dataset(_) | Error::ModelStructure(_) => ErrorCategory::Data,
            Error::Inference(_) | Error::NumericalInstability(_) => ErrorCategory::Inference,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether rerunning with changed inputs or settings can succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) | Error::InvalidPriors(_) | Error::InvalidSettings(_) => true,
            Error::Dataset(_) | Error::ModelStructure(_) => true,
            Error::Inference(_) => false,
            Error::NumericalInstability(_) => true,
            Error::Io(_) => true,
            Error::Json(_) => false,
        }
    }

    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::Config(_) => SuggestedAction::RunCheck,
            Error::InvalidPriors(_) => SuggestedAction::ResetConfig,
            Error::InvalidSettings(_) => SuggestedAction::RunCheck,
            Error::Dataset(_) | Error::ModelStructure(_) => SuggestedAction::FixInput,
            Error::Inference(_) => SuggestedAction::ManualIntervention,
            Error::NumericalInstability(_) => SuggestedAction::AdjustSettings,
            Error::Io(_) => SuggestedAction::Retry,
            Error::Json(_) => SuggestedAction::ManualIntervention,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Run 'npsa check' to validate configuration, or check syntax in config files."
            }
            Error::InvalidPriors(_) => {
                "Run 'npsa check --priors <file>' to validate, or start from 'npsa priors > priors.json'."
            }
            Error::InvalidSettings(_) => {
                "Run 'npsa check --inference <file>'. Damping must be in [0, 1) and iterations at least 1."
            }
            Error::Dataset(_) => {
                "Check the input files: one line per customer (interactions, responses) and one line per site slot (KPIs, labels)."
            }
            Error::ModelStructure(_) => {
                "Site indices must be below num_days * num_unique_sites and KPI rows must match the prior dimension."
            }
            Error::Inference(_) => "Internal inference failure. Rerun with -vv and report the log.",
            Error::NumericalInstability(_) => {
                "A precision matrix could not be repaired. Rescale the KPIs, strengthen the Wishart prior, or raise damping."
            }
            Error::Io(_) => "Check disk space, permissions, and that the output directory is writable.",
            Error::Json(_) => "Invalid JSON. Check syntax with 'jq . <file>'.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidPriors(_) => "Invalid Priors Configuration",
            Error::InvalidSettings(_) => "Invalid Inference Settings",
            Error::Dataset(_) => "Invalid Input Data",
            Error::ModelStructure(_) => "Model Structure Error",
            Error::Inference(_) => "Inference Error",
            Error::NumericalInstability(_) => "Numerical Instability",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Error",
        }
    }
}

/// Machine-readable error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    pub category: ErrorCategory,

    pub message: String,

    pub recoverable: bool,

    pub suggested_action: SuggestedAction,

    /// Additional structured context (e.g., file path, line).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
            context: HashMap::new(),
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for human-readable stderr output.
///
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(Error::Config("test".into()).code(), 10);
        assert_eq!(Error::Dataset("x".into()).code(), 20);
        assert_eq!(Error::NumericalInstability("x".into()).code(), 31);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            Error::InvalidPriors("x".into()).category(),
            ErrorCategory::Config
        );
        assert_eq!(
            Error::ModelStructure("x".into()).category(),
            ErrorCategory::Data
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(Error::from(io).category(), ErrorCategory::Io);
    }

    #[test]
    fn test_structured_error_json() {
        let err = Error::Dataset("responses line 3".into());
        let structured = StructuredError::from(&err).with_context("line", 3);
        let json = structured.to_json();
        assert!(json.contains("\"code\":20"));
        assert!(json.contains("\"category\":\"data\""));
        assert!(json.contains("\"suggested_action\":\"fix_input\""));
        assert!(json.contains("\"line\":3"));
    }

    #[test]
    fn test_format_error_human() {
        let err = Error::NumericalInstability("bad precision".into());
        let out = format_error_human(&err, false);
        assert!(out.contains("Numerical Instability"));
        assert!(out.contains("Reason: numerical instability detected: bad precision"));
        assert!(out.contains("Fix:"));
        assert!(!out.contains("\x1b["));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ErrorCategory::Inference.to_string(), "inference");
        assert_eq!(SuggestedAction::AdjustSettings.to_string(), "adjust_settings");
    }
}
