//! Error types
//!
//! Each concern gets its own enum; `ExperimentError` wraps them for the
//! experiment driver and the CLI.

use std::path::PathBuf;

/// Errors raised by layers and the model pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayerError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("shape mismatch in {context}: expected {expected} values, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl LayerError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        LayerError::InvalidConfiguration(msg.into())
    }

    /// Returns `Ok(())` when `actual == expected`.
    pub(crate) fn check_len(
        context: &'static str,
        expected: usize,
        actual: usize,
    ) -> Result<(), LayerError> {
        if expected == actual {
            Ok(())
        } else {
            Err(LayerError::ShapeMismatch {
                context,
                expected,
                actual,
            })
        }
    }
}

/// Errors raised while reading MNIST IDX files.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("could not read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: bad magic number {found:#010x} (expected {expected:#010x})")]
    BadMagic {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    #[error("{path}: unexpected image shape {rows}x{cols}")]
    UnexpectedShape {
        path: PathBuf,
        rows: usize,
        cols: usize,
    },

    #[error("{path}: file is truncated")]
    Truncated { path: PathBuf },

    #[error("{0} images but {1} labels")]
    CountMismatch(usize, usize),

    #[error("label {0} is out of range")]
    InvalidLabel(u8),
}

/// Errors raised while loading or validating an experiment config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in config")]
    Json(#[from] serde_json::Error),

    #[error("invalid batch size: {0} (must be > 0)")]
    InvalidBatchSize(usize),

    #[error("invalid epochs: {0} (must be > 0)")]
    InvalidEpochs(usize),

    #[error("invalid learning rate: {0} (must be > 0.0)")]
    InvalidLearningRate(f32),

    #[error("invalid {name}: {value} (must be in [0, 1))")]
    InvalidFraction { name: &'static str, value: f64 },

    #[error("invalid {name}: {value} (must be > 0)")]
    InvalidRank { name: &'static str, value: usize },

    #[error("high_rank and low_rank are both {0}; the two ranks must differ")]
    EqualRanks(usize),

    #[error("invalid init_stddev: {0} (must be > 0.0)")]
    InvalidInitStddev(f32),

    #[error("invalid epsilon: {0} (must be > 0.0)")]
    InvalidEpsilon(f32),

    #[error("unknown variant '{0}'")]
    UnknownVariant(String),
}

/// Top-level error for the experiment driver.
#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    #[error(transparent)]
    Layer(#[from] LayerError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not write {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("checkpoint does not match model: {0}")]
    Checkpoint(String),

    #[error("dataset is empty after applying the validation split")]
    EmptyDataset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_len() {
        assert!(LayerError::check_len("x", 3, 3).is_ok());
        let err = LayerError::check_len("input", 4, 3).unwrap_err();
        assert_eq!(
            err,
            LayerError::ShapeMismatch {
                context: "input",
                expected: 4,
                actual: 3
            }
        );
        assert_eq!(
            err.to_string(),
            "shape mismatch in input: expected 4 values, got 3"
        );
    }

    #[test]
    fn test_layer_error_converts() {
        let err: ExperimentError = LayerError::invalid("rank must be positive").into();
        assert_eq!(
            err.to_string(),
            "invalid configuration: rank must be positive"
        );
    }

    #[test]
    fn test_io_cause_is_reported_once() {
        use std::error::Error;

        let err = ExperimentError::Io {
            path: PathBuf::from("runs/summary.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "could not write runs/summary.json");
        let cause = err.source().map(|c| c.to_string());
        assert_eq!(cause.as_deref(), Some("denied"));

        let err: ExperimentError = DataError::Io {
            path: PathBuf::from("data/train-images.idx3-ubyte"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        }
        .into();
        assert!(!err.to_string().contains("missing"));
        assert_eq!(err.source().map(|c| c.to_string()).as_deref(), Some("missing"));
    }
}
