//! NPS attribution common types and errors.
//!
//! This crate provides foundational types shared across npsa crates:
//! - The CLI-facing error taxonomy with stable codes
//! - Output format specifications
//! - Result schema versioning

pub mod error;
pub mod output;

pub use error::{format_error_human, Error, ErrorCategory, Result, StructuredError, SuggestedAction};
pub use output::OutputFormat;

/// Schema version stamped on every machine-readable result.
pub const SCHEMA_VERSION: &str = "1.0.0";
