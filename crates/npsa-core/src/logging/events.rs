//! Structured event vocabulary.
//!
//! Every event carries the run id and the pipeline stage so JSONL output can
//! be filtered per run and per stage.

use serde::{Deserialize, Serialize};

/// Pipeline stages of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Reading the input files.
    Load,
    /// Wiring the factor graph.
    Build,
    /// Message-passing sweeps.
    Infer,
    /// Writing result files.
    Write,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Load => "load",
            Stage::Build => "build",
            Stage::Infer => "infer",
            Stage::Write => "write",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    // Config/init
    pub const CONFIG_LOADED: &str = "config.loaded";

    // Load stage
    pub const LOAD_FINISHED: &str = "load.finished";

    // Build stage
    pub const MODEL_BUILT: &str = "model.built";

    // Infer stage
    pub const INFER_SWEEP: &str = "infer.sweep";
    pub const INFER_PRECISION_REPAIRED: &str = "infer.precision_repaired";
    pub const INFER_CONVERGED: &str = "infer.converged";
    pub const INFER_NOT_CONVERGED: &str = "infer.not_converged";

    // Write stage
    pub const WRITE_FINISHED: &str = "write.finished";
}

/// Correlation context shared by every event of one run.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
        }
    }
}
