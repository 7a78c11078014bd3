//! Configuration loading and validation for the npsa binary.
//!
//! This module handles:
//! - Loading priors.json and inference.json
//! - Resolution order (CLI > env > XDG > defaults), delegated to npsa-config
//! - Semantic validation
//! - Config snapshot generation for the run summary

pub use npsa_config::validate::ValidationError;
pub use npsa_config::{ConfigSnapshot, ConfigSource, InferenceSettings, Priors};

use npsa_config::resolve::{resolve_config, CliConfigArgs, ConfigPaths};
use npsa_config::validate::{validate_priors, validate_settings};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("invalid JSON in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("semantic validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// `settings` selects the settings variant for content errors.
    fn into_common(self, settings: bool) -> npsa_common::Error {
        let msg = self.to_string();
        match self {
            ConfigError::NotFound { .. } | ConfigError::IoError { .. } => {
                npsa_common::Error::Config(msg)
            }
            _ if settings => npsa_common::Error::InvalidSettings(msg),
            _ => npsa_common::Error::InvalidPriors(msg),
        }
    }
}

/// Which file a [`ConfigError`] came from.
#[derive(Debug)]
pub struct LoadError {
    pub file: ConfigFile,
    pub error: ConfigError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFile {
    Priors,
    Inference,
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<LoadError> for npsa_common::Error {
    fn from(err: LoadError) -> Self {
        err.error.into_common(err.file == ConfigFile::Inference)
    }
}

/// Configuration resolution options.
#[derive(Debug, Default, Clone)]
pub struct ConfigOptions {
    /// Explicit config directory.
    pub config_dir: Option<PathBuf>,
    /// Explicit priors file path.
    pub priors_path: Option<PathBuf>,
    /// Explicit inference settings file path.
    pub inference_path: Option<PathBuf>,
}

/// Resolved configuration with provenance information.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub priors: Priors,
    pub settings: InferenceSettings,
    pub paths: ConfigPaths,
    pub snapshot: ConfigSnapshot,
}

impl ResolvedConfig {
    pub fn priors_source(&self) -> ConfigSource {
        self.paths.priors_source
    }

    pub fn inference_source(&self) -> ConfigSource {
        self.paths.inference_source
    }
}

/// Load and validate configuration.
///
/// An explicit path that does not exist is an error rather than a silent
/// fall-through to the next source.
pub fn load_config(options: &ConfigOptions) -> Result<ResolvedConfig, LoadError> {
    for (file, explicit) in [
        (ConfigFile::Priors, &options.priors_path),
        (ConfigFile::Inference, &options.inference_path),
    ] {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(LoadError {
                    file,
                    error: ConfigError::NotFound { path: path.clone() },
                });
            }
        }
    }

    let paths = resolve_config(CliConfigArgs {
        priors: options.priors_path.as_deref(),
        inference: options.inference_path.as_deref(),
        config_dir: options.config_dir.as_deref(),
    });

    let at = |file| move |error| LoadError { file, error };

    let (priors, priors_json) = match &paths.priors {
        Some(path) => {
            let (p, raw) = load_json::<Priors>(path).map_err(at(ConfigFile::Priors))?;
            (p, Some(raw))
        }
        None => (Priors::default(), None),
    };
    let (settings, inference_json) = match &paths.inference {
        Some(path) => {
            let (s, raw) =
                load_json::<InferenceSettings>(path).map_err(at(ConfigFile::Inference))?;
            (s, Some(raw))
        }
        None => (InferenceSettings::default(), None),
    };

    validate_priors(&priors).map_err(|e| at(ConfigFile::Priors)(e.into()))?;
    validate_settings(&settings).map_err(|e| at(ConfigFile::Inference)(e.into()))?;

    let snapshot = ConfigSnapshot::new(
        &priors,
        &settings,
        &paths,
        priors_json.as_deref(),
        inference_json.as_deref(),
    );

    Ok(ResolvedConfig {
        priors,
        settings,
        paths,
        snapshot,
    })
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<(T, String), ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let value = serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok((value, content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn empty_config_options() -> ConfigOptions {
        let temp_dir = env::temp_dir().join("npsa-core-test-config-nonexistent");
        ConfigOptions {
            config_dir: Some(temp_dir),
            ..ConfigOptions::default()
        }
    }

    #[test]
    fn test_missing_explicit_path_is_not_found() {
        let options = ConfigOptions {
            priors_path: Some(PathBuf::from("/nonexistent/npsa/priors.json")),
            ..empty_config_options()
        };
        let err = load_config(&options).unwrap_err();
        assert_eq!(err.file, ConfigFile::Priors);
        assert!(matches!(err.error, ConfigError::NotFound { .. }));
        let common: npsa_common::Error = err.into();
        assert_eq!(common.code(), 10);
    }

    #[test]
    fn test_explicit_files_load_and_hash() {
        let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../test/fixtures/config");
        let options = ConfigOptions {
            priors_path: Some(fixtures.join("valid_priors.json")),
            inference_path: Some(fixtures.join("valid_inference.json")),
            ..empty_config_options()
        };
        let config = load_config(&options).unwrap();
        assert_eq!(config.priors.kpi_dimension(), 2);
        assert_eq!(config.priors_source(), ConfigSource::CliArgument);
        assert_eq!(config.inference_source(), ConfigSource::CliArgument);
        assert!(config.snapshot.priors_hash.is_some());
        assert!(config.snapshot.inference_hash.is_some());
    }

    #[test]
    fn test_invalid_settings_map_to_settings_error() {
        let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../test/fixtures/config");
        let options = ConfigOptions {
            inference_path: Some(fixtures.join("invalid_inference_damping.json")),
            ..empty_config_options()
        };
        let err = load_config(&options).unwrap_err();
        assert_eq!(err.file, ConfigFile::Inference);
        let common: npsa_common::Error = err.into();
        assert!(matches!(common, npsa_common::Error::InvalidSettings(_)));
    }
}
