//! Command-line interface
//!
//! ```bash
//! low-rank-experiment run --data-dir ./data --epochs 2 --max-train 6000
//! low-rank-experiment run --config quick.json --variant control --variant layer7_rank1
//! low-rank-experiment list
//! low-rank-experiment validate quick.json
//! ```

use crate::architecture::build_model;
use crate::config::{load_config, ExperimentConfig};
use crate::error::{ConfigError, ExperimentError};
use crate::experiment::run_experiment;
use crate::utils::SimpleRng;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Low-rank layer placement experiment on MNIST
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "low-rank-experiment")]
#[command(version)]
#[command(about = "Measures how a low-rank layer at different CNN depths affects MNIST accuracy")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// More log output (repeat for trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl Cli {
    pub fn verbosity(&self) -> i8 {
        if self.quiet {
            -1
        } else {
            i8::try_from(self.verbose).unwrap_or(i8::MAX)
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Train and test the selected variants
    Run(RunArgs),

    /// Print every variant with its layer stack and parameter count
    List(ListArgs),

    /// Check a configuration file without training
    Validate(ValidateArgs),
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct RunArgs {
    /// JSON experiment configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding the MNIST IDX files
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Where histories, checkpoints and the summary go
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    #[arg(short, long)]
    pub epochs: Option<usize>,

    #[arg(short, long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub lr: Option<f32>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Run only this variant (repeatable), e.g. `control` or `layer4_rank32`
    #[arg(long = "variant", value_name = "ID")]
    pub variants: Vec<String>,

    /// Use at most this many training images
    #[arg(long)]
    pub max_train: Option<usize>,

    /// Use at most this many test images
    #[arg(long)]
    pub max_test: Option<usize>,
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ListArgs {
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,
}

/// Parse from an explicit argument list.
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

fn base_config(path: Option<&PathBuf>) -> Result<ExperimentConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => Ok(ExperimentConfig::default()),
    }
}

/// Apply command-line overrides on top of a loaded config and revalidate.
pub fn apply_overrides(mut config: ExperimentConfig, args: &RunArgs) -> Result<ExperimentConfig, ConfigError> {
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(lr) = args.lr {
        config.learning_rate = lr;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if !args.variants.is_empty() {
        config.variants = Some(args.variants.clone());
    }
    if args.max_train.is_some() {
        config.max_train_samples = args.max_train;
    }
    if args.max_test.is_some() {
        config.max_test_samples = args.max_test;
    }
    config.validate()?;
    Ok(config)
}

fn run(args: &RunArgs) -> Result<(), ExperimentError> {
    let config = apply_overrides(base_config(args.config.as_ref())?, args)?;
    let report = run_experiment(&config)?;

    println!("{:<16} {:>10} {:>10} {:>10}", "variant", "params", "loss", "accuracy");
    for record in &report.runs {
        println!(
            "{:<16} {:>10} {:>10.4} {:>9.2}%",
            record.config.id,
            record.parameter_count,
            record.test.loss,
            record.test.accuracy * 100.0
        );
    }
    for impact in &report.rank_impacts {
        println!(
            "Percentile impact of low-rank layer being placed on layer {}: {}%",
            impact.depth, impact.difference
        );
    }
    Ok(())
}

fn list(args: &ListArgs) -> Result<(), ExperimentError> {
    let config = base_config(args.config.as_ref())?;
    for run in config.selected_runs() {
        let architecture = run.architecture(config.dropout_rate, config.init_stddev)?;
        let model = build_model(&architecture, &mut SimpleRng::new(config.seed))?;
        println!(
            "{}  placement={}  rank={}",
            run.id,
            run.placement,
            run.rank.map_or_else(|| "-".to_string(), |r| r.to_string())
        );
        println!("{}\n", model.summary());
    }
    Ok(())
}

fn validate(args: &ValidateArgs) -> Result<(), ExperimentError> {
    let config = load_config(&args.config)?;
    println!(
        "{}: ok ({} variants, {} epochs, batch size {})",
        args.config.display(),
        config.selected_runs().len(),
        config.epochs,
        config.batch_size
    );
    Ok(())
}

pub fn run_command(cli: &Cli) -> Result<(), ExperimentError> {
    match &cli.command {
        Command::Run(args) => run(args),
        Command::List(args) => list(args),
        Command::Validate(args) => validate(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = parse_args([
            "low-rank-experiment",
            "run",
            "--epochs",
            "2",
            "--variant",
            "control",
            "--variant",
            "layer7_rank1",
            "--max-train",
            "100",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbosity(), 2);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.epochs, Some(2));
                assert_eq!(args.variants, vec!["control", "layer7_rank1"]);

                let config = apply_overrides(ExperimentConfig::default(), &args).unwrap();
                assert_eq!(config.epochs, 2);
                assert_eq!(config.max_train_samples, Some(100));
                assert_eq!(config.selected_runs().len(), 2);
            }
            other => panic!("Expected Run command, got {:?}", other),
        }
    }

    #[test]
    fn test_override_is_validated() {
        let cli = parse_args(["low-rank-experiment", "run", "--batch-size", "0"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("Expected Run command");
        };
        assert!(matches!(
            apply_overrides(ExperimentConfig::default(), &args),
            Err(ConfigError::InvalidBatchSize(0))
        ));
    }

    #[test]
    fn test_parse_validate_and_quiet() {
        let cli = parse_args(["low-rank-experiment", "-q", "validate", "cfg.json"]).unwrap();
        assert_eq!(cli.verbosity(), -1);
        assert_eq!(
            cli.command,
            Command::Validate(ValidateArgs {
                config: PathBuf::from("cfg.json")
            })
        );
    }

    #[test]
    fn test_unknown_subcommand() {
        assert!(parse_args(["low-rank-experiment", "plot"]).is_err());
    }
}
