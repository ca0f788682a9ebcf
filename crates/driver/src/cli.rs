//! CLI wiring for the gemmtune benchmark driver.

use crate::options::TuneArgs;
use crate::session::TuningSession;
use anyhow::Result;
use clap::Parser;
use gemmtune_autotune::report::TextReport;
use gemmtune_backend_cpu::device::Platform;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "bench-matmul",
    about = "Search for the fastest tiled matmul configuration on a device"
)]
pub struct Cli {
    /// cpu, gpu or acc, optionally followed by the device number (gpu1)
    #[arg(short = 'd', long)]
    pub device: Option<String>,
    /// Matrix dimension M
    #[arg(short = 'm', long)]
    pub m: Option<usize>,
    /// Matrix dimension N
    #[arg(short = 'n', long)]
    pub n: Option<usize>,
    /// Matrix dimension K
    #[arg(short = 'k', long)]
    pub k: Option<usize>,
    /// Work item group width and height
    #[arg(short = 'g', long)]
    pub group_size: Option<usize>,
    /// Inner blocking height
    #[arg(short = 'y', long)]
    pub block_height: Option<usize>,
    /// Extra parameter
    #[arg(short = 'x', long)]
    pub extra_param: Option<usize>,
    /// Number of trials
    #[arg(short = 't', long, default_value_t = 1)]
    pub trials: usize,
    /// Keep the topN fastest configurations after every trial
    #[arg(short = 'w', long)]
    pub top_n: Option<usize>,
    /// Use faster nested optimization
    #[arg(short = 'e', long)]
    pub nested: bool,
    /// Transpose A
    #[arg(short = 'a', long)]
    pub transpose_a: bool,
    /// Transpose B
    #[arg(short = 'b', long)]
    pub transpose_b: bool,
    /// Include data transfer to the device in timing
    #[arg(short = 's', long)]
    pub transfer_to_device: bool,
    /// Include data transfer from the device in timing
    #[arg(short = 'r', long)]
    pub transfer_from_device: bool,
    /// Check the whole output matrix against the reference product
    #[arg(short = 'p', long)]
    pub paranoid: bool,
    /// Disable the kernel vector attribute hint
    #[arg(short = 'v', long)]
    pub no_vector_hint: bool,
    /// Print the output matrix of every trial
    #[arg(short = 'z', long)]
    pub print_matrix: bool,
    /// Sweep only extra parameter 0 when every dimension is free
    #[arg(long)]
    pub quick_scan: bool,
    /// Kernel family to tune
    #[arg(long, default_value = "tiled")]
    pub kernel: String,
    /// Best-configuration cache, updated when a faster configuration is found
    #[arg(long)]
    pub cache: Option<PathBuf>,
    /// Write every pass summary as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,
}

impl From<Cli> for TuneArgs {
    fn from(cli: Cli) -> Self {
        TuneArgs {
            device: cli.device,
            kernel: cli.kernel,
            m: cli.m,
            n: cli.n,
            k: cli.k,
            group_size: cli.group_size,
            block_height: cli.block_height,
            extra_param: cli.extra_param,
            trials: cli.trials,
            top_n: cli.top_n,
            nested: cli.nested,
            transpose_a: cli.transpose_a,
            transpose_b: cli.transpose_b,
            transfer_to_device: cli.transfer_to_device,
            transfer_from_device: cli.transfer_from_device,
            paranoid_check: cli.paranoid,
            vector_hint: !cli.no_vector_hint,
            print_matrix: cli.print_matrix,
            quick_scan: cli.quick_scan,
            cache: cli.cache,
            json: cli.json,
        }
    }
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let options = TuneArgs::from(cli).validate()?;
    let session = TuningSession::new(options)?;
    let mut report = TextReport::stdout();
    let outcome = session.run(&Platform::host(), &mut report)?;

    match &outcome.best {
        Some(best) => info!(
            configuration = %best.configuration,
            average_us = best.average_time_us,
            gflops = best.gflops,
            good_kernels = outcome.good_kernel_count(),
            "tuning finished"
        ),
        None => warn!("tuning finished without a viable configuration"),
    }
    Ok(())
}
