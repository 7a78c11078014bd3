//! Model construction: dataset, graph structure and builder.

pub mod builder;
pub mod dataset;
pub mod graph;

pub use builder::{ModelBuilder, ModelError};
pub use dataset::Dataset;
pub use graph::{KpiState, LabelState, ModelGraph, ModelPriors, SiteSpec, TouchArena, BAD, GOOD};
