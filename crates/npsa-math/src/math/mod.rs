//! Core math modules.

pub mod stable;
pub mod bernoulli;
pub mod beta;
pub mod gaussian;
pub mod linalg;
pub mod vector_gaussian;
pub mod wishart;
