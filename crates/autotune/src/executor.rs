//! Boundary traits for the device and the trial runner.

use anyhow::Result;
use gemmtune_kernels::config::Configuration;
use serde::{Deserialize, Serialize};

/// Capability queries the search needs from a compute device.
pub trait DeviceCapabilities {
    fn name(&self) -> &str;

    /// Largest number of work items in one work-group.
    fn max_work_group_size(&self) -> Result<usize>;
}

/// Per-trial flags handed to the executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrialRequest {
    pub round: usize,
    /// First round of a pass; the executor may build and prime the kernel.
    pub warmup: bool,
    pub transfer_to_device: bool,
    pub transfer_from_device: bool,
    pub paranoid_check: bool,
    pub verbose: bool,
}

/// Measurements from one execution of one configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub elapsed_us: u64,
    pub flops: u64,
    pub ok: bool,
    /// Executor-defined diagnostic counters, summed across rounds.
    pub detail: Vec<u64>,
}

/// Runs a single benchmark trial.
///
/// Implementations must allow repeated calls for the same configuration and
/// return timings that are comparable across calls. An `Err` means the
/// device failed; the caller records the candidate as not ok and continues.
pub trait TrialExecutor {
    fn execute(&mut self, config: &Configuration, request: &TrialRequest) -> Result<TrialOutcome>;
}
