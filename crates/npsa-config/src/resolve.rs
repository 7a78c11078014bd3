//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI arguments → environment variables → XDG paths → defaults.

use std::path::{Path, PathBuf};

/// Discovered configuration file paths.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Path to priors.json (or None if not found).
    pub priors: Option<PathBuf>,

    /// Path to inference.json (or None if not found).
    pub inference: Option<PathBuf>,

    pub priors_source: ConfigSource,

    pub inference_source: ConfigSource,
}

/// Where a configuration file was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument (file or `--config-dir`).
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Environment variable names.
pub const ENV_PRIORS_PATH: &str = "NPSA_PRIORS";
pub const ENV_INFERENCE_PATH: &str = "NPSA_INFERENCE";
pub const ENV_CONFIG_DIR: &str = "NPSA_CONFIG_DIR";

/// Standard config file names.
pub const PRIORS_FILENAME: &str = "priors.json";
pub const INFERENCE_FILENAME: &str = "inference.json";

/// Application name for XDG directories.
const APP_NAME: &str = "npsa";

/// Explicit locations supplied on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliConfigArgs<'a> {
    pub priors: Option<&'a Path>,
    pub inference: Option<&'a Path>,
    pub config_dir: Option<&'a Path>,
}

/// Resolve configuration paths using the standard resolution order.
///
/// Resolution order for each config file:
/// 1. Explicit CLI path
/// 2. CLI `--config-dir` + filename
/// 3. Environment variable (NPSA_PRIORS, NPSA_INFERENCE)
/// 4. NPSA_CONFIG_DIR environment variable + filename
/// 5. XDG config directory (~/.config/npsa/)
/// 6. Built-in defaults (None)
pub fn resolve_config(cli: CliConfigArgs<'_>) -> ConfigPaths {
    let (priors, priors_source) =
        resolve_single_config(cli.priors, cli.config_dir, ENV_PRIORS_PATH, PRIORS_FILENAME);
    let (inference, inference_source) = resolve_single_config(
        cli.inference,
        cli.config_dir,
        ENV_INFERENCE_PATH,
        INFERENCE_FILENAME,
    );

    ConfigPaths {
        priors,
        inference,
        priors_source,
        inference_source,
    }
}

fn resolve_single_config(
    cli_path: Option<&Path>,
    cli_dir: Option<&Path>,
    env_var: &str,
    filename: &str,
) -> (Option<PathBuf>, ConfigSource) {
    if let Some(path) = cli_path {
        if path.exists() {
            return (Some(path.to_path_buf()), ConfigSource::CliArgument);
        }
    }

    if let Some(dir) = cli_dir {
        let path = dir.join(filename);
        if path.exists() {
            return (Some(path), ConfigSource::CliArgument);
        }
    }

    if let Ok(env_path) = std::env::var(env_var) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return (Some(path), ConfigSource::Environment);
        }
    }

    if let Ok(config_dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = PathBuf::from(config_dir).join(filename);
        if path.exists() {
            return (Some(path), ConfigSource::Environment);
        }
    }

    if let Some(dir) = xdg_config_dir() {
        let path = dir.join(filename);
        if path.exists() {
            return (Some(path), ConfigSource::XdgConfig);
        }
    }

    (None, ConfigSource::BuiltinDefault)
}

/// Get the XDG config directory for npsa.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_source_display() {
        assert_eq!(format!("{}", ConfigSource::CliArgument), "CLI argument");
        assert_eq!(
            format!("{}", ConfigSource::Environment),
            "environment variable"
        );
        assert_eq!(format!("{}", ConfigSource::XdgConfig), "XDG config");
        assert_eq!(
            format!("{}", ConfigSource::BuiltinDefault),
            "builtin default"
        );
    }

    #[test]
    fn test_xdg_config_dir() {
        if let Some(path) = xdg_config_dir() {
            assert!(path.ends_with(APP_NAME));
        }
    }

    #[test]
    fn test_missing_cli_path_falls_through() {
        let missing = Path::new("/nonexistent/npsa/priors.json");
        let (path, _) =
            resolve_single_config(Some(missing), None, "NPSA_TEST_UNSET_VAR", PRIORS_FILENAME);
        assert_ne!(path.as_deref(), Some(missing));
    }
}
