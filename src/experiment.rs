//! The placement experiment: train every variant, score it on the test set
//! and compare the two ranks at each depth.

use crate::architecture::{build_model, variant_architecture, ArchitectureConfig, Placement};
use crate::checkpoint::Checkpoint;
use crate::config::ExperimentConfig;
use crate::data::{load_mnist, Dataset};
use crate::error::{ExperimentError, LayerError};
use crate::model::Sequential;
use crate::train::{evaluate, History, Score, Trainer};
use crate::utils::SimpleRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, info_span, warn};

/// One variant: where the low-rank layer goes and how many terms it sums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub id: String,
    pub placement: Placement,
    /// `None` for the control model.
    pub rank: Option<usize>,
}

impl RunConfig {
    pub fn control() -> Self {
        Self {
            id: "control".to_string(),
            placement: Placement::Control,
            rank: None,
        }
    }

    pub fn low_rank(depth: u8, rank: usize) -> Self {
        Self {
            id: format!("layer{}_rank{}", depth, rank),
            placement: Placement::Depth(depth),
            rank: Some(rank),
        }
    }

    /// Control first, then each depth with the high rank before the low one.
    pub fn all(high_rank: usize, low_rank: usize) -> Vec<RunConfig> {
        let mut runs = vec![RunConfig::control()];
        for placement in Placement::depths() {
            if let Some(depth) = placement.depth() {
                runs.push(RunConfig::low_rank(depth, high_rank));
                runs.push(RunConfig::low_rank(depth, low_rank));
            }
        }
        runs
    }

    /// `model_{depth}_{rank}`, or `model_control_control`.
    pub fn checkpoint_name(&self) -> String {
        match (self.placement.depth(), self.rank) {
            (Some(depth), Some(rank)) => format!("model_{}_{}", depth, rank),
            _ => "model_control_control".to_string(),
        }
    }

    pub fn architecture(&self, dropout_rate: f32, init_stddev: f32) -> Result<ArchitectureConfig, LayerError> {
        variant_architecture(self.placement, self.rank.unwrap_or(0), dropout_rate, init_stddev)
    }
}

/// A finished run: its configuration, training history and test score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub config: RunConfig,
    pub parameter_count: usize,
    pub history: History,
    pub test: Score,
}

/// Test accuracy difference between the low and high rank at one depth, in
/// percentage points rounded to three decimals. Negative means the low rank
/// did worse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankImpact {
    pub depth: u8,
    pub high_rank: usize,
    pub low_rank: usize,
    pub high_accuracy: f32,
    pub low_accuracy: f32,
    pub difference: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub runs: Vec<RunRecord>,
    pub rank_impacts: Vec<RankImpact>,
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Pair the `high_rank` and `low_rank` runs of every depth that has both.
pub fn rank_impacts(records: &[RunRecord], high_rank: usize, low_rank: usize) -> Vec<RankImpact> {
    let find = |depth: u8, rank: usize| {
        records
            .iter()
            .find(|r| r.config.placement == Placement::Depth(depth) && r.config.rank == Some(rank))
    };

    Placement::depths()
        .filter_map(|placement| placement.depth())
        .filter_map(|depth| {
            let high = find(depth, high_rank)?;
            let low = find(depth, low_rank)?;
            let difference = f64::from(low.test.accuracy - high.test.accuracy) * 100.0;
            Some(RankImpact {
                depth,
                high_rank,
                low_rank,
                high_accuracy: high.test.accuracy,
                low_accuracy: low.test.accuracy,
                difference: round3(difference),
            })
        })
        .collect()
}

fn create_dir(path: &Path) -> Result<(), ExperimentError> {
    fs::create_dir_all(path).map_err(|source| ExperimentError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Train and test a single variant.
pub fn run_variant(
    config: &ExperimentConfig,
    run: &RunConfig,
    train: &Dataset,
    validation: &Dataset,
    test: &Dataset,
    rng: &mut SimpleRng,
) -> Result<(RunRecord, Sequential), ExperimentError> {
    let architecture = run.architecture(config.dropout_rate, config.init_stddev)?;
    let mut model = build_model(&architecture, rng)?;
    info!(variant = %run.id, parameters = model.parameter_count(), "built model");

    let mut optimizer = config.build_optimizer();
    let history = Trainer::new(config.epochs, config.batch_size).fit(
        &mut model,
        optimizer.as_mut(),
        train,
        Some(validation),
        rng,
    )?;
    let test = evaluate(&mut model, test, config.batch_size)?;
    info!(variant = %run.id, loss = test.loss, accuracy = test.accuracy, "test score");

    let record = RunRecord {
        config: run.clone(),
        parameter_count: model.parameter_count(),
        history,
        test,
    };
    Ok((record, model))
}

/// Run every selected variant on already-loaded data and write the reports
/// under `config.output_dir`.
pub fn run_on_data(
    config: &ExperimentConfig,
    train_full: &Dataset,
    test: &Dataset,
) -> Result<ExperimentReport, ExperimentError> {
    let (train, validation) = train_full.split_validation(config.validation_split);
    if train.is_empty() {
        return Err(ExperimentError::EmptyDataset);
    }
    info!(
        train = train.len(),
        validation = validation.len(),
        test = test.len(),
        "data split"
    );
    create_dir(&config.output_dir)?;

    let selected = config.selected_runs();
    let mut runs = Vec::with_capacity(selected.len());
    // Each variant draws from its own stream, so a subset of variants
    // reproduces the same runs as the full experiment.
    for (stream, run) in RunConfig::all(config.high_rank, config.low_rank)
        .into_iter()
        .enumerate()
        .filter(|(_, run)| selected.contains(run))
    {
        let _span = info_span!("variant", id = %run.id).entered();
        let mut rng = SimpleRng::fork(config.seed, stream as u64);
        let (record, model) = run_variant(config, &run, &train, &validation, test, &mut rng)?;

        let history_path = config.output_dir.join(format!("history_{}.csv", run.id));
        record
            .history
            .save_csv(&history_path)
            .map_err(|source| ExperimentError::Io {
                path: history_path.clone(),
                source,
            })?;
        if config.save_checkpoints {
            let path = checkpoint_path(&config.output_dir, &run);
            Checkpoint::capture(&run.id, &model).save(&path)?;
        }
        runs.push(record);
    }

    let rank_impacts = rank_impacts(&runs, config.high_rank, config.low_rank);
    for impact in &rank_impacts {
        info!(
            "Percentile impact of low-rank layer being placed on layer {}: {}%",
            impact.depth, impact.difference
        );
    }
    if rank_impacts.is_empty() && runs.len() > 1 {
        warn!("no depth ran with both ranks; nothing to compare");
    }

    let report = ExperimentReport { runs, rank_impacts };
    let summary = config.output_dir.join("summary.json");
    let json = serde_json::to_string_pretty(&report)?;
    fs::write(&summary, json).map_err(|source| ExperimentError::Io {
        path: summary.clone(),
        source,
    })?;
    info!(path = %summary.display(), "wrote summary");
    Ok(report)
}

/// Load MNIST from `config.data_dir` and run the experiment.
pub fn run_experiment(config: &ExperimentConfig) -> Result<ExperimentReport, ExperimentError> {
    config.validate()?;
    let (train, test) = load_mnist(&config.data_dir, config.max_train_samples, config.max_test_samples)?;
    run_on_data(config, &train, &test)
}

pub fn checkpoint_path(output_dir: &Path, run: &RunConfig) -> PathBuf {
    output_dir.join(format!("{}.json", run.checkpoint_name()))
}

/// Rebuild `run`'s model and load the weights saved at `path`.
pub fn load_checkpointed_model(
    config: &ExperimentConfig,
    run: &RunConfig,
    path: &Path,
) -> Result<Sequential, ExperimentError> {
    let checkpoint = Checkpoint::load(path)?;
    if checkpoint.variant != run.id {
        return Err(ExperimentError::Checkpoint(format!(
            "checkpoint is for '{}', not '{}'",
            checkpoint.variant, run.id
        )));
    }
    let architecture = run.architecture(config.dropout_rate, config.init_stddev)?;
    let mut model = build_model(&architecture, &mut SimpleRng::new(config.seed))?;
    checkpoint.restore(&mut model)?;
    model.set_training(false);
    Ok(model)
}
