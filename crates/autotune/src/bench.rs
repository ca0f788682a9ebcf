//! Multi-trial benchmark loop with survivor pruning.

use crate::executor::{TrialExecutor, TrialRequest};
use crate::prune::{count_alive, mark_survivors};
use crate::report::{PassSummary, ReportSink};
use crate::stats::TrialStat;
use anyhow::Result;
use gemmtune_kernels::config::{Configuration, ProblemShape};
use gemmtune_kernels::matmul::MatmulKernelFamily;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchOptions {
    /// Number of trial rounds, warm-up round included.
    pub trials: usize,
    /// Survivors kept after each round; `None` disables pruning.
    pub top_n: Option<usize>,
    pub transfer_to_device: bool,
    pub transfer_from_device: bool,
    pub paranoid_check: bool,
    pub verbose: bool,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            trials: 1,
            top_n: None,
            transfer_to_device: false,
            transfer_from_device: false,
            paranoid_check: false,
            verbose: false,
        }
    }
}

impl BenchOptions {
    fn request(&self, round: usize) -> TrialRequest {
        TrialRequest {
            round,
            warmup: round == 0,
            transfer_to_device: self.transfer_to_device,
            transfer_from_device: self.transfer_from_device,
            paranoid_check: self.paranoid_check,
            verbose: self.verbose,
        }
    }
}

pub struct BenchmarkOrchestrator<'a> {
    executor: &'a mut dyn TrialExecutor,
    sink: &'a mut dyn ReportSink,
    options: BenchOptions,
}

impl<'a> BenchmarkOrchestrator<'a> {
    pub fn new(
        executor: &'a mut dyn TrialExecutor,
        sink: &'a mut dyn ReportSink,
        options: BenchOptions,
    ) -> Self {
        Self {
            executor,
            sink,
            options,
        }
    }

    /// Benchmark `candidates` for the configured number of rounds.
    ///
    /// Every round runs the alive candidates in enumeration order. A failed
    /// trial marks its candidate as not ok and the round carries on. The
    /// returned summary's `good_kernel_count` counts candidates that are
    /// still alive and never failed.
    pub fn run_pass(
        &mut self,
        label: &str,
        family: &dyn MatmulKernelFamily,
        shape: ProblemShape,
        candidates: Vec<Configuration>,
    ) -> Result<PassSummary> {
        let mut stats = vec![TrialStat::new(); candidates.len()];
        self.sink.pass_started(label, candidates.len())?;
        info!(
            pass = label,
            candidates = candidates.len(),
            trials = self.options.trials,
            top_n = ?self.options.top_n,
            "starting benchmark pass"
        );

        for round in 0..self.options.trials {
            let request = self.options.request(round);

            for (index, (config, stat)) in candidates.iter().zip(stats.iter_mut()).enumerate() {
                if !stat.alive {
                    continue;
                }
                match self.executor.execute(config, &request) {
                    Ok(outcome) => {
                        debug!(
                            round,
                            index,
                            config = %config,
                            elapsed_us = outcome.elapsed_us,
                            ok = outcome.ok,
                            "trial finished"
                        );
                        stat.record(&outcome);
                    }
                    Err(err) => {
                        warn!(round, index, config = %config, error = %err, "trial failed");
                        stat.record_failure();
                    }
                }
            }

            let alive = match self.options.top_n {
                Some(top_n) => mark_survivors(top_n, &mut stats),
                None => count_alive(&stats),
            };
            debug!(round, alive, "round complete");
            self.sink.round_finished(round, alive)?;
        }

        let summary = PassSummary::new(
            label,
            family,
            shape,
            self.options.trials,
            candidates,
            stats,
        );
        info!(
            pass = label,
            good_kernels = summary.good_kernel_count,
            "benchmark pass complete"
        );
        self.sink.pass_finished(&summary)?;
        Ok(summary)
    }
}
