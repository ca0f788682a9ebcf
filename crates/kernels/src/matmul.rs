//! Matrix multiplication kernel families.

use crate::config::{
    Configuration, KernelParams, ProblemShape, MAX_BLOCK_HEIGHT, MAX_GROUP_SIZE, VECTOR_WIDTH,
};
use crate::utils::validate_matmul_inputs;
use anyhow::{anyhow, ensure, Result};
use ndarray::{Array2, ArrayView2, ArrayViewMut2, Axis};
use rayon::prelude::*;
use std::sync::Arc;

/// Operands as stored on the device, already in the layout the problem asks for.
pub struct MatmulInputs<'a> {
    pub lhs: ArrayView2<'a, f32>,
    pub rhs: ArrayView2<'a, f32>,
}

impl<'a> MatmulInputs<'a> {
    pub fn new(lhs: ArrayView2<'a, f32>, rhs: ArrayView2<'a, f32>) -> Self {
        Self { lhs, rhs }
    }
}

/// A parameterized kernel whose variants are selected by [`KernelParams`].
///
/// Validation is a pure function of the problem and the parameters, so the
/// search can enumerate candidates without touching any kernel state.
pub trait MatmulKernelFamily: Send + Sync {
    fn name(&self) -> &'static str;
    fn vector_width(&self) -> usize;
    fn max_block_height(&self) -> usize;
    fn max_group_size(&self) -> usize;

    /// Number of extra-parameter values for the given group size and block height.
    fn total_variations(&self, shape: &ProblemShape, group_size: usize, block_height: usize)
        -> usize;

    /// Materialize `params` as a configuration, or `None` when the variant is illegal.
    fn validate(&self, shape: &ProblemShape, params: KernelParams) -> Option<Configuration>;

    /// Recover the parameters a configuration was built from.
    fn decode(&self, config: &Configuration) -> Result<KernelParams>;

    fn run(
        &self,
        config: &Configuration,
        inputs: &MatmulInputs<'_>,
        vector_hint: bool,
    ) -> Result<Array2<f32>>;
}

pub type DynKernelFamily = Arc<dyn MatmulKernelFamily>;

/// Register-blocked GEMM.
///
/// A work-group is `group_size x group_size` work items and every work item
/// computes `block_height` rows by `VECTOR_WIDTH` columns of the output. The
/// extra parameter picks the K-loop unroll factor and whether partial sums
/// stay in a private accumulator before the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiledMatmul;

/// Decoded form of a tiled configuration's value tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TiledVariant {
    group_size: usize,
    block_height: usize,
    k_unroll: usize,
    inline_accumulate: bool,
    extra_param: usize,
}

const TUPLE_LEN: usize = 6;

impl TiledVariant {
    fn from_values(values: &[usize]) -> Result<Self> {
        ensure!(
            values.len() == TUPLE_LEN,
            "tiled configuration expects {} values, got {}",
            TUPLE_LEN,
            values.len()
        );
        ensure!(
            values[2] == VECTOR_WIDTH,
            "configuration vector width {} does not match kernel width {}",
            values[2],
            VECTOR_WIDTH
        );
        Ok(Self {
            group_size: values[0],
            block_height: values[1],
            k_unroll: values[3],
            inline_accumulate: values[4] != 0,
            extra_param: values[5],
        })
    }

    fn to_values(self) -> Vec<usize> {
        vec![
            self.group_size,
            self.block_height,
            VECTOR_WIDTH,
            self.k_unroll,
            usize::from(self.inline_accumulate),
            self.extra_param,
        ]
    }
}

/// Powers of two up to the block height.
fn unroll_choices(block_height: usize) -> impl Iterator<Item = usize> {
    std::iter::successors(Some(1usize), |u| u.checked_mul(2)).take_while(move |u| *u <= block_height)
}

impl TiledMatmul {
    pub fn new() -> Self {
        Self
    }

    fn variant(block_height: usize, extra_param: usize) -> Option<(usize, bool)> {
        let k_unroll = unroll_choices(block_height).nth(extra_param / 2)?;
        Some((k_unroll, extra_param % 2 == 1))
    }
}

impl MatmulKernelFamily for TiledMatmul {
    fn name(&self) -> &'static str {
        "tiled"
    }

    fn vector_width(&self) -> usize {
        VECTOR_WIDTH
    }

    fn max_block_height(&self) -> usize {
        MAX_BLOCK_HEIGHT
    }

    fn max_group_size(&self) -> usize {
        MAX_GROUP_SIZE
    }

    fn total_variations(
        &self,
        _shape: &ProblemShape,
        _group_size: usize,
        block_height: usize,
    ) -> usize {
        2 * unroll_choices(block_height).count()
    }

    fn validate(&self, shape: &ProblemShape, params: KernelParams) -> Option<Configuration> {
        let KernelParams {
            group_size,
            block_height,
            extra_param,
        } = params;

        if group_size == 0 || group_size > MAX_GROUP_SIZE {
            return None;
        }
        if block_height < VECTOR_WIDTH || block_height > MAX_BLOCK_HEIGHT {
            return None;
        }
        if shape.m % (group_size * block_height) != 0 || shape.n % (group_size * VECTOR_WIDTH) != 0
        {
            return None;
        }
        // transposed A is read in vector-width row strips
        if shape.layout.transpose_a && block_height % VECTOR_WIDTH != 0 {
            return None;
        }

        let (k_unroll, inline_accumulate) = Self::variant(block_height, extra_param)?;
        if shape.k % (k_unroll * VECTOR_WIDTH) != 0 {
            return None;
        }

        let variant = TiledVariant {
            group_size,
            block_height,
            k_unroll,
            inline_accumulate,
            extra_param,
        };
        Some(Configuration::new(*shape, variant.to_values()))
    }

    fn decode(&self, config: &Configuration) -> Result<KernelParams> {
        let variant = TiledVariant::from_values(&config.values)?;
        Ok(KernelParams::new(
            variant.group_size,
            variant.block_height,
            variant.extra_param,
        ))
    }

    fn run(
        &self,
        config: &Configuration,
        inputs: &MatmulInputs<'_>,
        vector_hint: bool,
    ) -> Result<Array2<f32>> {
        let variant = TiledVariant::from_values(&config.values)?;
        let shape = config.shape;
        validate_matmul_inputs(&shape, inputs)?;
        ensure!(
            variant.group_size > 0 && variant.block_height > 0 && variant.k_unroll > 0,
            "degenerate tiled configuration {}",
            config
        );

        let band = variant.group_size * variant.block_height;
        let tile_cols = variant.group_size * VECTOR_WIDTH;
        ensure!(
            shape.m % band == 0 && shape.n % tile_cols == 0,
            "configuration {} does not tile {}",
            config,
            shape
        );

        let mut output = Array2::<f32>::zeros((shape.m, shape.n));
        output
            .axis_chunks_iter_mut(Axis(0), band)
            .into_par_iter()
            .enumerate()
            .for_each(|(group_row, mut rows)| {
                let row0 = group_row * band;
                for col0 in (0..shape.n).step_by(tile_cols) {
                    for ly in 0..variant.group_size {
                        for lx in 0..variant.group_size {
                            let item = WorkItem {
                                local_row: ly * variant.block_height,
                                global_row: row0 + ly * variant.block_height,
                                col: col0 + lx * VECTOR_WIDTH,
                            };
                            item.compute(&variant, &shape, inputs, &mut rows, vector_hint);
                        }
                    }
                }
            });

        Ok(output)
    }
}

struct WorkItem {
    local_row: usize,
    global_row: usize,
    col: usize,
}

impl WorkItem {
    fn compute(
        &self,
        variant: &TiledVariant,
        shape: &ProblemShape,
        inputs: &MatmulInputs<'_>,
        rows: &mut ArrayViewMut2<'_, f32>,
        vector_hint: bool,
    ) {
        let lhs = inputs.lhs;
        let rhs = inputs.rhs;
        let a = |i: usize, p: usize| {
            if shape.layout.transpose_a {
                lhs[[p, i]]
            } else {
                lhs[[i, p]]
            }
        };
        let b = |p: usize, j: usize| {
            if shape.layout.transpose_b {
                rhs[[j, p]]
            } else {
                rhs[[p, j]]
            }
        };
        let step = variant.k_unroll * VECTOR_WIDTH;

        for r in 0..variant.block_height {
            let i = self.global_row + r;
            let out_row = self.local_row + r;

            if vector_hint {
                let mut acc = [0.0f32; VECTOR_WIDTH];
                for p0 in (0..shape.k).step_by(step) {
                    for p in p0..p0 + step {
                        let av = a(i, p);
                        for (lane, slot) in acc.iter_mut().enumerate() {
                            *slot += av * b(p, self.col + lane);
                        }
                    }
                    if !variant.inline_accumulate {
                        for (lane, slot) in acc.iter_mut().enumerate() {
                            rows[[out_row, self.col + lane]] += *slot;
                            *slot = 0.0;
                        }
                    }
                }
                if variant.inline_accumulate {
                    for (lane, value) in acc.iter().enumerate() {
                        rows[[out_row, self.col + lane]] = *value;
                    }
                }
            } else {
                for lane in 0..VECTOR_WIDTH {
                    let j = self.col + lane;
                    let mut sum = 0.0f32;
                    for p0 in (0..shape.k).step_by(step) {
                        for p in p0..p0 + step {
                            sum += a(i, p) * b(p, j);
                        }
                    }
                    rows[[out_row, j]] = sum;
                }
            }
        }
    }
}

/// Plain `ndarray` product used as the correctness reference.
pub fn reference_matmul(shape: &ProblemShape, inputs: &MatmulInputs<'_>) -> Result<Array2<f32>> {
    validate_matmul_inputs(shape, inputs)?;
    let lhs = if shape.layout.transpose_a {
        inputs.lhs.t()
    } else {
        inputs.lhs.view()
    };
    let rhs = if shape.layout.transpose_b {
        inputs.rhs.t()
    } else {
        inputs.rhs.view()
    };
    Ok(lhs.dot(&rhs))
}

/// Look up a kernel family by name.
pub fn find_kernel_family(name: &str) -> Result<DynKernelFamily> {
    match name {
        "tiled" => Ok(Arc::new(TiledMatmul::new())),
        other => Err(anyhow!("unknown kernel family {other}")),
    }
}
