//! Loss, metrics and the training loop.

pub mod loss;
pub mod metrics;
pub mod trainer;

pub use metrics::{EpochMetrics, History, Score};
pub use trainer::{evaluate, train_step, Trainer};
