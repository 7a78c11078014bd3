//! NPS attribution configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for priors.json and inference.json
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation
//! - Config snapshots embedded in run summaries

pub mod priors;
pub mod resolve;
pub mod settings;
pub mod snapshot;
pub mod validate;

pub use priors::Priors;
pub use resolve::{resolve_config, CliConfigArgs, ConfigPaths, ConfigSource};
pub use settings::InferenceSettings;
pub use snapshot::ConfigSnapshot;
pub use validate::{ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
