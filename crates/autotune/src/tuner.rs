//! Single-pass and nested two-pass tuning.

use crate::bench::{BenchOptions, BenchmarkOrchestrator};
use crate::executor::{DeviceCapabilities, TrialExecutor};
use crate::report::{PassSummary, ReportSink};
use crate::space::{ConfigurationSpace, EnumerationStrategy, SearchLimits, SearchMode};
use anyhow::{ensure, Result};
use gemmtune_kernels::config::{KernelParams, KernelProfile, ProblemShape};
use gemmtune_kernels::matmul::MatmulKernelFamily;
use tracing::{info, warn};

/// What to tune and how hard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuningRequest {
    pub shape: ProblemShape,
    pub group_size: Option<usize>,
    pub block_height: Option<usize>,
    pub extra_param: Option<usize>,
    /// Find (group size, block height) with one cheap trial, then refine the
    /// extra parameter with the full trial budget.
    pub nested: bool,
    pub mode: SearchMode,
    pub bench: BenchOptions,
}

impl TuningRequest {
    pub fn new(shape: ProblemShape) -> Self {
        Self {
            shape,
            group_size: None,
            block_height: None,
            extra_param: None,
            nested: false,
            mode: SearchMode::default(),
            bench: BenchOptions::default(),
        }
    }

    pub fn strategy(&self) -> Result<EnumerationStrategy> {
        EnumerationStrategy::from_dimensions(self.group_size, self.block_height, self.extra_param)
    }
}

#[derive(Debug, Clone)]
pub struct TuningOutcome {
    pub passes: Vec<PassSummary>,
    /// Group size and block height carried from the first nested pass.
    pub nested_pair: Option<(usize, usize)>,
    pub best: Option<KernelProfile>,
}

impl TuningOutcome {
    pub fn final_pass(&self) -> Option<&PassSummary> {
        self.passes.last()
    }

    pub fn good_kernel_count(&self) -> usize {
        self.final_pass().map_or(0, |pass| pass.good_kernel_count)
    }
}

pub struct Autotuner<'a> {
    family: &'a dyn MatmulKernelFamily,
    device: &'a dyn DeviceCapabilities,
    executor: &'a mut dyn TrialExecutor,
    sink: &'a mut dyn ReportSink,
    limits: SearchLimits,
}

impl<'a> Autotuner<'a> {
    pub fn new(
        family: &'a dyn MatmulKernelFamily,
        device: &'a dyn DeviceCapabilities,
        executor: &'a mut dyn TrialExecutor,
        sink: &'a mut dyn ReportSink,
    ) -> Self {
        Self {
            family,
            device,
            executor,
            sink,
            limits: SearchLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn run(&mut self, request: &TuningRequest) -> Result<TuningOutcome> {
        let strategy = request.strategy()?;
        if !request.nested {
            let pass = self.run_pass("search", request, strategy, request.bench)?;
            let best = pass.best_profile();
            return Ok(TuningOutcome {
                passes: vec![pass],
                nested_pair: None,
                best,
            });
        }

        ensure!(
            strategy == EnumerationStrategy::AllFree,
            "nested optimization will find optimal blocking; leave all parameters free"
        );

        let broad = BenchOptions {
            trials: 1,
            ..request.bench
        };
        let first = self.run_pass("nested optimization first pass", request, strategy, broad)?;

        let Some(winner) = first.best() else {
            warn!("first pass produced no viable configuration; skipping second pass");
            return Ok(TuningOutcome {
                passes: vec![first],
                nested_pair: None,
                best: None,
            });
        };
        let KernelParams {
            group_size,
            block_height,
            ..
        } = self.family.decode(&winner.configuration)?;
        info!(
            group_size,
            block_height,
            winner = winner.index,
            average_us = winner.stat.average_us,
            "refining around first pass winner"
        );

        let focused = EnumerationStrategy::ExtraFree {
            group_size,
            block_height,
        };
        let second = self.run_pass(
            "nested optimization second pass",
            request,
            focused,
            request.bench,
        )?;
        let best = second.best_profile();

        Ok(TuningOutcome {
            passes: vec![first, second],
            nested_pair: Some((group_size, block_height)),
            best,
        })
    }

    fn run_pass(
        &mut self,
        label: &str,
        request: &TuningRequest,
        strategy: EnumerationStrategy,
        options: BenchOptions,
    ) -> Result<PassSummary> {
        let space = ConfigurationSpace::new(self.family, request.shape)
            .with_limits(self.limits)
            .with_mode(request.mode);
        let candidates = space.enumerate(strategy, self.device)?;

        BenchmarkOrchestrator::new(&mut *self.executor, &mut *self.sink, options).run_pass(
            label,
            self.family,
            request.shape,
            candidates,
        )
    }
}
