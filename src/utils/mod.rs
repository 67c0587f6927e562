//! Shared utilities: random number generation and activation helpers.

pub mod activations;
pub mod rng;

pub use rng::SimpleRng;
