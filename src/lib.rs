//! Low-Rank MNIST
//!
//! A small from-scratch f32 network toolkit and the experiment built on it:
//! a low-rank linear layer (an N×N matrix kept as a sum of outer products) is
//! spliced into a CNN digit classifier at different depths, and the accuracy
//! of a high-rank and a rank-1 layer is compared at each depth.
//!
//! # Modules
//!
//! - `layers`: Layer trait, parameters, and the layers (LowRank, Conv2D, Dense, etc.)
//! - `optimizers`: Optimizer trait with Adam and SGD
//! - `model`: Sequential pipeline with cached activations and backward pass
//! - `architecture`: Layer configurations, variant placements and model building
//! - `data`: MNIST IDX reader and in-memory datasets
//! - `train`: Loss, per-epoch history and the training loop
//! - `experiment`: Run configurations, the variant loop and rank comparison
//! - `checkpoint`: JSON snapshots of trained parameters
//! - `config`, `cli`, `logging`: Experiment configuration, command line and tracing
//! - `utils`: RNG and activation helpers

pub mod architecture;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod experiment;
pub mod layers;
pub mod logging;
pub mod model;
pub mod optimizers;
pub mod train;
pub mod utils;

pub use error::{ConfigError, DataError, ExperimentError, LayerError};
pub use layers::{Layer, LowRankLayer};
pub use model::Sequential;
