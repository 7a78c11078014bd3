//! Configuration validation + resolution tests against real JSON fixtures.
//!
//! Covers:
//! - Priors and inference settings validation
//! - Resolution order (CLI > CLI dir > env > config dir > XDG)

use npsa_config::resolve::{resolve_config, CliConfigArgs, ConfigSource};
use npsa_config::validate::{validate_priors, validate_settings, ValidationError};
use npsa_config::{InferenceSettings, Priors};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const ENV_KEYS: [&str; 4] = [
    "NPSA_PRIORS",
    "NPSA_INFERENCE",
    "NPSA_CONFIG_DIR",
    "XDG_CONFIG_HOME",
];

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("test")
        .join("fixtures")
        .join("config")
}

fn load_priors_fixture(name: &str) -> Priors {
    Priors::from_file(&fixtures_dir().join(name)).expect("read priors fixture")
}

fn load_settings_fixture(name: &str) -> InferenceSettings {
    InferenceSettings::from_file(&fixtures_dir().join(name)).expect("read settings fixture")
}

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn new(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|k| (k.to_string(), env::var(k).ok()))
            .collect();
        for key in keys {
            env::remove_var(key);
        }
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }
}

fn with_env_lock<T>(f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .expect("env lock poisoned");
    f()
}

fn write_config_dir(dir: &Path) {
    fs::create_dir_all(dir).expect("create config dir");
    fs::copy(
        fixtures_dir().join("valid_priors.json"),
        dir.join("priors.json"),
    )
    .expect("copy priors");
    fs::copy(
        fixtures_dir().join("valid_inference.json"),
        dir.join("inference.json"),
    )
    .expect("copy inference");
}

#[test]
fn test_validate_priors_fixture_ok() {
    let priors = load_priors_fixture("valid_priors.json");
    validate_priors(&priors).expect("valid priors should pass validation");
    assert_eq!(priors.kpi_dimension(), 2);
}

#[test]
fn test_validate_priors_rejects_bad_beta() {
    let priors = load_priors_fixture("invalid_priors_bad_beta.json");
    let err = validate_priors(&priors).expect_err("bad beta should fail validation");
    assert!(matches!(err, ValidationError::InvalidValue { .. }));
}

#[test]
fn test_validate_priors_rejects_dimension_mismatch() {
    let priors = load_priors_fixture("invalid_priors_dim_mismatch.json");
    let err = validate_priors(&priors).expect_err("mismatch should fail validation");
    assert!(matches!(err, ValidationError::SemanticError(_)));
}

#[test]
fn test_validate_settings_fixtures() {
    let ok = load_settings_fixture("valid_inference.json");
    validate_settings(&ok).expect("valid settings");
    assert!(ok.stop_on_convergence);
    assert!(!ok.parallel);

    let bad = load_settings_fixture("invalid_inference_damping.json");
    let err = validate_settings(&bad).expect_err("damping 1.5 should fail");
    assert_eq!(err.code(), 65);
}

#[test]
fn test_missing_file_is_io_error() {
    let err = Priors::from_file(Path::new("/nonexistent/priors.json")).unwrap_err();
    assert!(matches!(err, ValidationError::IoError(_)));
}

#[test]
fn test_resolve_config_cli_over_env() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&ENV_KEYS);

        let temp = TempDir::new().expect("temp dir");
        let cli_dir = temp.path().join("cli");
        let env_dir = temp.path().join("env");
        write_config_dir(&cli_dir);
        write_config_dir(&env_dir);

        env::set_var("NPSA_PRIORS", env_dir.join("priors.json"));
        env::set_var("NPSA_CONFIG_DIR", &env_dir);

        let cli_priors = cli_dir.join("priors.json");
        let paths = resolve_config(CliConfigArgs {
            priors: Some(&cli_priors),
            inference: None,
            config_dir: Some(&cli_dir),
        });

        assert_eq!(paths.priors_source, ConfigSource::CliArgument);
        assert_eq!(paths.priors.unwrap(), cli_priors);
        // --config-dir beats NPSA_CONFIG_DIR for the file not named explicitly
        assert_eq!(paths.inference_source, ConfigSource::CliArgument);
        assert_eq!(paths.inference.unwrap(), cli_dir.join("inference.json"));
    });
}

#[test]
fn test_resolve_config_env_over_config_dir() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&ENV_KEYS);

        let temp = TempDir::new().expect("temp dir");
        let env_dir = temp.path().join("env");
        let config_dir = temp.path().join("config_dir");
        write_config_dir(&env_dir);
        write_config_dir(&config_dir);

        env::set_var("NPSA_PRIORS", env_dir.join("priors.json"));
        env::set_var("NPSA_CONFIG_DIR", &config_dir);

        let paths = resolve_config(CliConfigArgs::default());
        assert_eq!(paths.priors_source, ConfigSource::Environment);
        assert_eq!(paths.priors.unwrap(), env_dir.join("priors.json"));
        assert_eq!(paths.inference_source, ConfigSource::Environment);
        assert_eq!(paths.inference.unwrap(), config_dir.join("inference.json"));
    });
}

#[test]
fn test_resolve_config_xdg_fallback() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&ENV_KEYS);

        let temp = TempDir::new().expect("temp dir");
        let xdg_dir = temp.path().join("xdg");
        let app_dir = xdg_dir.join("npsa");
        write_config_dir(&app_dir);

        env::set_var("XDG_CONFIG_HOME", &xdg_dir);

        let paths = resolve_config(CliConfigArgs::default());
        assert_eq!(paths.priors_source, ConfigSource::XdgConfig);
        assert_eq!(paths.priors.unwrap(), app_dir.join("priors.json"));
    });
}

#[test]
fn test_resolve_config_defaults_when_nothing_found() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&ENV_KEYS);
        let temp = TempDir::new().expect("temp dir");
        env::set_var("XDG_CONFIG_HOME", temp.path());

        let paths = resolve_config(CliConfigArgs::default());
        assert!(paths.priors.is_none());
        assert_eq!(paths.priors_source, ConfigSource::BuiltinDefault);
        assert_eq!(paths.inference_source, ConfigSource::BuiltinDefault);
    });
}
