//! Benchmark driver executable for gemmtune.

use clap::Parser;
use gemmtune_driver::cli::{run_cli, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    // help and usage errors exit with 1 like every other invalid invocation
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::FAILURE;
        }
    };
    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
