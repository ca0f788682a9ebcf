//! Tuning session: one search on one device, plus persistence of results.

use crate::options::TuneOptions;
use anyhow::Result;
use gemmtune_autotune::cache::AutotuneCache;
use gemmtune_autotune::executor::DeviceCapabilities;
use gemmtune_autotune::report::{save_summaries, ReportSink};
use gemmtune_autotune::tuner::{Autotuner, TuningOutcome};
use gemmtune_backend_cpu::device::Platform;
use gemmtune_backend_cpu::runtime::{CpuExecutor, CpuExecutorOptions};
use gemmtune_kernels::matmul::{find_kernel_family, DynKernelFamily};
use tracing::info;

/// One tuning run: device selection, search, and persistence of results.
pub struct TuningSession {
    options: TuneOptions,
    family: DynKernelFamily,
}

impl TuningSession {
    pub fn new(options: TuneOptions) -> Result<Self> {
        let family = find_kernel_family(&options.kernel)?;
        Ok(Self { options, family })
    }

    pub fn run(&self, platform: &Platform, sink: &mut dyn ReportSink) -> Result<TuningOutcome> {
        let request = &self.options.request;
        let device = platform.select(self.options.device)?;
        info!(
            device = device.name(),
            kernel = self.family.name(),
            m = request.shape.m,
            n = request.shape.n,
            k = request.shape.k,
            nested = request.nested,
            "starting tuning session"
        );

        if let Some(path) = &self.options.cache {
            let cache = AutotuneCache::load_from_file(path)?;
            if let Some(previous) = cache.get(device.name(), &request.shape) {
                info!(
                    configuration = %previous.configuration,
                    average_us = previous.average_time_us,
                    "previous best from cache"
                );
            }
        }

        let executor_options = CpuExecutorOptions {
            vector_hint: self.options.vector_hint,
            ..CpuExecutorOptions::default()
        };
        let mut executor =
            CpuExecutor::new(device, self.family.clone(), request.shape, executor_options)?;

        let outcome = Autotuner::new(self.family.as_ref(), device, &mut executor, sink).run(request)?;
        self.persist(device.name(), &outcome)?;
        Ok(outcome)
    }

    fn persist(&self, device: &str, outcome: &TuningOutcome) -> Result<()> {
        if let (Some(path), Some(best)) = (&self.options.cache, &outcome.best) {
            let mut cache = AutotuneCache::load_from_file(path)?;
            if cache.insert_if_faster(device, best.clone()) {
                cache.save_to_file(path)?;
                info!(path = %path.display(), "updated best configuration cache");
            }
        }
        if let Some(path) = &self.options.json {
            save_summaries(&outcome.passes, path)?;
            info!(path = %path.display(), passes = outcome.passes.len(), "wrote pass summaries");
        }
        Ok(())
    }
}
