// low_rank_experiment.rs
// Trains the control CNN and the twelve low-rank variants on MNIST and
// reports how much the rank-1 layer costs at each depth.
//
// Expected files (see `--data-dir`):
//   ./data/train-images.idx3-ubyte
//   ./data/train-labels.idx1-ubyte
//   ./data/t10k-images.idx3-ubyte
//   ./data/t10k-labels.idx1-ubyte
//
// Output (see `--output-dir`):
//   - runs/history_{variant}.csv
//   - runs/model_{depth}_{rank}.json
//   - runs/summary.json

use clap::Parser;
use low_rank_mnist::cli::{run_command, Cli};
use low_rank_mnist::logging::init_tracing;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.verbosity()) {
        eprintln!("Warning: {e}");
    }

    match run_command(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
