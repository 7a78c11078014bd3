//! Distribution library for NPS detractor attribution.
//!
//! Closed-form beliefs (Bernoulli, Beta, Gaussian, VectorGaussian, Wishart)
//! plus the log-domain and linear-algebra primitives the inference engine
//! relies on.

pub mod error;
pub mod math;

pub use error::MathError;
pub use math::bernoulli::{Bernoulli, MAX_LOG_ODDS};
pub use math::beta::Beta;
pub use math::gaussian::{positive_truncation_factors, Gaussian};
pub use math::linalg;
pub use math::stable::*;
pub use math::vector_gaussian::VectorGaussian;
pub use math::wishart::Wishart;
