//! NPS Detractor Attribution Core Library
//!
//! This library provides:
//! - Exit codes for CLI operations
//! - Configuration loading and validation
//! - Dataset loading and result writing
//! - Model building (the fixed factor graph)
//! - EP/VMP inference over the attribution model
//!
//! The binary entry point is in `main.rs`.

pub mod config;
pub mod exit_codes;
pub mod inference;
pub mod io;
pub mod logging;
pub mod model;
