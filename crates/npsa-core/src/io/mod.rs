//! Dataset input and result output.

pub mod loader;
pub mod writer;

pub use loader::{load_dataset, DatasetError, DatasetPaths, MISSING_SENTINEL};
pub use writer::{ResultWriter, RunSummary, WriteError};
