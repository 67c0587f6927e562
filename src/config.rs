//! Experiment configuration
//!
//! Every field is optional in the JSON file; missing fields fall back to
//! [`ExperimentConfig::default`].
//!
//! ```json
//! {
//!   "data_dir": "./data",
//!   "epochs": 2,
//!   "max_train_samples": 6000,
//!   "variants": ["control", "layer7_rank32", "layer7_rank1"]
//! }
//! ```

use crate::error::ConfigError;
use crate::experiment::RunConfig;
use crate::optimizers::{Adam, Optimizer, SGD};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Which optimizer trains each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Directory holding the four MNIST IDX files.
    pub data_dir: PathBuf,
    /// Where histories, checkpoints and the summary are written.
    pub output_dir: PathBuf,
    pub batch_size: usize,
    pub epochs: usize,
    pub optimizer: OptimizerKind,
    pub learning_rate: f32,
    /// Adam only.
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    /// Trailing fraction of the training set held out for validation.
    /// Kept in `f64` so `floor(n * (1 - split))` matches the decimal value.
    pub validation_split: f64,
    pub dropout_rate: f32,
    pub high_rank: usize,
    pub low_rank: usize,
    /// Standard deviation of the low-rank factor initialisation.
    pub init_stddev: f32,
    pub seed: u64,
    pub max_train_samples: Option<usize>,
    pub max_test_samples: Option<usize>,
    /// Variant ids to run; all of them when absent.
    pub variants: Option<Vec<String>>,
    pub save_checkpoints: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            output_dir: PathBuf::from("./runs"),
            batch_size: 4,
            epochs: 20,
            optimizer: OptimizerKind::Adam,
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            validation_split: 0.1,
            dropout_rate: 0.5,
            high_rank: 32,
            low_rank: 1,
            init_stddev: 0.05,
            seed: 42,
            max_train_samples: None,
            max_test_samples: None,
            variants: None,
            save_checkpoints: true,
        }
    }
}

impl ExperimentConfig {
    /// A fresh optimizer for one run.
    pub fn build_optimizer(&self) -> Box<dyn Optimizer> {
        match self.optimizer {
            OptimizerKind::Adam => Box::new(Adam::new(
                self.learning_rate,
                self.beta1,
                self.beta2,
                self.epsilon,
            )),
            OptimizerKind::Sgd => Box::new(SGD::new(self.learning_rate)),
        }
    }

    /// The variants selected by `variants`, in canonical order.
    pub fn selected_runs(&self) -> Vec<RunConfig> {
        let all = RunConfig::all(self.high_rank, self.low_rank);
        match &self.variants {
            None => all,
            Some(ids) => all.into_iter().filter(|run| ids.contains(&run.id)).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_config(self)
    }
}

/// Loads and validates an experiment configuration from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use low_rank_mnist::config::load_config;
///
/// let cfg = load_config("config/quick.json").unwrap();
/// assert!(cfg.epochs > 0);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ExperimentConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ExperimentConfig = serde_json::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

fn check_fraction(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidFraction { name, value })
    }
}

fn validate_config(config: &ExperimentConfig) -> Result<(), ConfigError> {
    if config.batch_size == 0 {
        return Err(ConfigError::InvalidBatchSize(config.batch_size));
    }
    if config.epochs == 0 {
        return Err(ConfigError::InvalidEpochs(config.epochs));
    }
    if config.learning_rate.is_nan() || config.learning_rate <= 0.0 {
        return Err(ConfigError::InvalidLearningRate(config.learning_rate));
    }
    check_fraction("beta1", f64::from(config.beta1))?;
    check_fraction("beta2", f64::from(config.beta2))?;
    if config.epsilon.is_nan() || config.epsilon <= 0.0 {
        return Err(ConfigError::InvalidEpsilon(config.epsilon));
    }
    check_fraction("validation_split", config.validation_split)?;
    check_fraction("dropout_rate", f64::from(config.dropout_rate))?;

    if config.high_rank == 0 {
        return Err(ConfigError::InvalidRank {
            name: "high_rank",
            value: config.high_rank,
        });
    }
    if config.low_rank == 0 {
        return Err(ConfigError::InvalidRank {
            name: "low_rank",
            value: config.low_rank,
        });
    }
    if config.low_rank == config.high_rank {
        return Err(ConfigError::EqualRanks(config.low_rank));
    }
    if config.low_rank > config.high_rank {
        warn!(
            low_rank = config.low_rank,
            high_rank = config.high_rank,
            "low_rank is above high_rank"
        );
    }
    if config.init_stddev.is_nan() || config.init_stddev <= 0.0 {
        return Err(ConfigError::InvalidInitStddev(config.init_stddev));
    }

    if let Some(ids) = &config.variants {
        let known = RunConfig::all(config.high_rank, config.low_rank);
        if let Some(unknown) = ids.iter().find(|id| !known.iter().any(|run| &run.id == *id)) {
            return Err(ConfigError::UnknownVariant(unknown.clone()));
        }
    }
    Ok(())
}
