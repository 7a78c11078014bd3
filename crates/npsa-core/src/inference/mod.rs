//! Approximate inference over the attribution model.
//!
//! Expectation propagation on the noisy-OR layer and variational message
//! passing on the mixture layer, scheduled as synchronous sweeps by
//! [`InferenceEngine`].

pub mod beliefs;
pub mod components;
pub mod engine;
pub mod mixture;
pub mod noisy_or;

pub use beliefs::BeliefTable;
pub use components::Parameter;
pub use engine::{
    infer, ComponentPosterior, ConvergenceWarning, InferenceEngine, InferenceError,
    InferenceResult,
};
