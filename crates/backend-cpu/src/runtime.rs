//! CPU trial executor.

use crate::device::CpuDevice;
use anyhow::{ensure, Result};
use gemmtune_autotune::executor::{TrialExecutor, TrialOutcome, TrialRequest};
use gemmtune_kernels::config::{Configuration, ProblemShape};
use gemmtune_kernels::matmul::{reference_matmul, DynKernelFamily, MatmulInputs};
use gemmtune_kernels::utils::{deterministic_tensor, dot_tolerance, max_abs_error};
use ndarray::Array2;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CpuExecutorOptions {
    /// Accumulate in vector-width lane arrays instead of scalar sums.
    pub vector_hint: bool,
    /// Output entries compared against exact dot products when the paranoid
    /// check is off.
    pub sample_points: usize,
}

impl Default for CpuExecutorOptions {
    fn default() -> Self {
        Self {
            vector_hint: true,
            sample_points: 16,
        }
    }
}

/// Runs configurations of one kernel family on the host CPU.
///
/// Host operands live in the layout the problem asks for. Every trial copies
/// them into fresh "device" buffers and copies the product back, so transfer
/// time is measured on each call whether or not it is counted.
pub struct CpuExecutor {
    family: DynKernelFamily,
    shape: ProblemShape,
    options: CpuExecutorOptions,
    pool: ThreadPool,
    host_lhs: Array2<f32>,
    host_rhs: Array2<f32>,
    reference: Option<Array2<f32>>,
}

impl CpuExecutor {
    pub fn new(
        device: &CpuDevice,
        family: DynKernelFamily,
        shape: ProblemShape,
        options: CpuExecutorOptions,
    ) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(device.compute_units())
            .build()?;
        let (lhs_rows, lhs_cols) = shape.lhs_dims();
        let (rhs_rows, rhs_cols) = shape.rhs_dims();

        Ok(Self {
            family,
            shape,
            options,
            pool,
            host_lhs: deterministic_tensor(lhs_rows, lhs_cols),
            host_rhs: deterministic_tensor(rhs_rows, rhs_cols),
            reference: None,
        })
    }

    fn reference(&mut self) -> Result<&Array2<f32>> {
        let reference = match self.reference.take() {
            Some(reference) => reference,
            None => {
                let inputs = MatmulInputs::new(self.host_lhs.view(), self.host_rhs.view());
                reference_matmul(&self.shape, &inputs)?
            }
        };
        Ok(self.reference.insert(reference))
    }

    fn check_output(&mut self, output: &Array2<f32>, paranoid: bool) -> Result<bool> {
        let tolerance = dot_tolerance(self.shape.k);
        if paranoid {
            let error = max_abs_error(&output.view(), &self.reference()?.view());
            return Ok(error <= tolerance);
        }

        if output.dim() != (self.shape.m, self.shape.n) {
            return Ok(false);
        }
        let total = self.shape.m * self.shape.n;
        if total == 0 {
            return Ok(true);
        }
        let points = self.options.sample_points.max(1);
        let stride = (total / points).max(1);
        for flat in (0..total).step_by(stride).chain(std::iter::once(total - 1)) {
            let (i, j) = (flat / self.shape.n, flat % self.shape.n);
            let expected = self.exact_entry(i, j);
            if (output[(i, j)] as f64 - expected).abs() > tolerance {
                debug!(i, j, got = output[(i, j)], expected, "sampled entry mismatch");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn exact_entry(&self, i: usize, j: usize) -> f64 {
        let layout = self.shape.layout;
        (0..self.shape.k)
            .map(|p| {
                let a = if layout.transpose_a {
                    self.host_lhs[(p, i)]
                } else {
                    self.host_lhs[(i, p)]
                };
                let b = if layout.transpose_b {
                    self.host_rhs[(j, p)]
                } else {
                    self.host_rhs[(p, j)]
                };
                a as f64 * b as f64
            })
            .sum()
    }
}

impl TrialExecutor for CpuExecutor {
    fn execute(&mut self, config: &Configuration, request: &TrialRequest) -> Result<TrialOutcome> {
        ensure!(
            config.shape == self.shape,
            "executor prepared for {} cannot run {}",
            self.shape,
            config.shape
        );

        let start = Instant::now();
        let device_lhs = self.host_lhs.to_owned();
        let device_rhs = self.host_rhs.to_owned();
        let to_device = start.elapsed();

        let inputs = MatmulInputs::new(device_lhs.view(), device_rhs.view());
        let family = &self.family;
        let vector_hint = self.options.vector_hint;

        if request.warmup {
            // first launch pays for building the variant; keep it out of the timing
            self.pool.install(|| family.run(config, &inputs, vector_hint))?;
        }

        let start = Instant::now();
        let device_out = self.pool.install(|| family.run(config, &inputs, vector_hint))?;
        let kernel = start.elapsed();

        let start = Instant::now();
        let host_out = device_out.to_owned();
        let from_device = start.elapsed();

        let mut elapsed = kernel;
        if request.transfer_to_device {
            elapsed += to_device;
        }
        if request.transfer_from_device {
            elapsed += from_device;
        }

        let ok = self.check_output(&host_out, request.paranoid_check)?;
        if !ok {
            warn!(config = %config, round = request.round, "output check failed");
        }
        if request.verbose {
            println!("{config}\n{host_out}");
        }

        Ok(TrialOutcome {
            elapsed_us: micros(elapsed),
            flops: self.shape.flops(),
            ok,
            detail: vec![micros(kernel), micros(to_device), micros(from_device)],
        })
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use gemmtune_kernels::config::{KernelParams, Layout};
    use gemmtune_kernels::matmul::{MatmulKernelFamily, TiledMatmul};
    use std::sync::Arc;

    /// Wraps the tiled kernel and corrupts one output entry.
    struct Corrupting(TiledMatmul);

    impl MatmulKernelFamily for Corrupting {
        fn name(&self) -> &'static str {
            "corrupting"
        }
        fn vector_width(&self) -> usize {
            self.0.vector_width()
        }
        fn max_block_height(&self) -> usize {
            self.0.max_block_height()
        }
        fn max_group_size(&self) -> usize {
            self.0.max_group_size()
        }
        fn total_variations(&self, shape: &ProblemShape, g: usize, b: usize) -> usize {
            self.0.total_variations(shape, g, b)
        }
        fn validate(&self, shape: &ProblemShape, params: KernelParams) -> Option<Configuration> {
            self.0.validate(shape, params)
        }
        fn decode(&self, config: &Configuration) -> Result<KernelParams> {
            self.0.decode(config)
        }
        fn run(
            &self,
            config: &Configuration,
            inputs: &MatmulInputs<'_>,
            vector_hint: bool,
        ) -> Result<Array2<f32>> {
            if config.values[5] == 1 {
                bail!("launch failed");
            }
            let mut out = self.0.run(config, inputs, vector_hint)?;
            out[(1, 2)] += 1.0;
            Ok(out)
        }
    }

    fn executor(family: DynKernelFamily, shape: ProblemShape) -> CpuExecutor {
        let device = CpuDevice::new("test", 2, 1024);
        CpuExecutor::new(&device, family, shape, CpuExecutorOptions::default()).unwrap()
    }

    #[test]
    fn correct_kernel_passes_both_checks() {
        let shape = ProblemShape::new(32, 32, 16).with_layout(Layout::new(true, false));
        let kernel = Arc::new(TiledMatmul::new());
        let config = kernel.validate(&shape, KernelParams::new(4, 8, 0)).unwrap();
        let mut exec = executor(kernel, shape);

        for paranoid in [false, true] {
            let request = TrialRequest {
                warmup: true,
                paranoid_check: paranoid,
                transfer_to_device: true,
                transfer_from_device: true,
                ..TrialRequest::default()
            };
            let outcome = exec.execute(&config, &request).unwrap();
            assert!(outcome.ok);
            assert_eq!(outcome.flops, shape.flops());
            assert_eq!(outcome.detail.len(), 3);
            assert!(outcome.elapsed_us >= outcome.detail[0]);
        }
    }

    #[test]
    fn paranoid_check_catches_a_single_bad_entry() {
        let shape = ProblemShape::new(16, 16, 16);
        let family: DynKernelFamily = Arc::new(Corrupting(TiledMatmul::new()));
        let config = family.validate(&shape, KernelParams::new(2, 4, 0)).unwrap();
        let mut exec = executor(family, shape);
        let request = TrialRequest {
            paranoid_check: true,
            ..TrialRequest::default()
        };
        assert!(!exec.execute(&config, &request).unwrap().ok);
    }

    #[test]
    fn launch_errors_propagate() {
        let shape = ProblemShape::new(16, 16, 16);
        let family: DynKernelFamily = Arc::new(Corrupting(TiledMatmul::new()));
        let config = family.validate(&shape, KernelParams::new(2, 4, 1)).unwrap();
        let mut exec = executor(family, shape);
        assert!(exec.execute(&config, &TrialRequest::default()).is_err());
    }

    #[test]
    fn rejects_foreign_shapes() {
        let kernel = Arc::new(TiledMatmul::new());
        let other = ProblemShape::square(64);
        let config = kernel.validate(&other, KernelParams::new(8, 4, 0)).unwrap();
        let mut exec = executor(kernel, ProblemShape::square(32));
        assert!(exec.execute(&config, &TrialRequest::default()).is_err());
    }
}
