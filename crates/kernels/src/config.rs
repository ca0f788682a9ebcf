//! Problem shape and kernel configuration structures.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of `f32` lanes a work item produces per output row.
pub const VECTOR_WIDTH: usize = 4;

/// Largest inner blocking height the tiled kernel family accepts.
pub const MAX_BLOCK_HEIGHT: usize = 10;

/// Largest work-group edge the tiled kernel family accepts.
pub const MAX_GROUP_SIZE: usize = 16;

/// Storage layout of the two input operands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Layout {
    pub transpose_a: bool,
    pub transpose_b: bool,
}

impl Layout {
    pub fn new(transpose_a: bool, transpose_b: bool) -> Self {
        Self {
            transpose_a,
            transpose_b,
        }
    }
}

/// Dimensions of `C[M, N] = A[M, K] * B[K, N]` plus operand layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProblemShape {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub layout: Layout,
}

impl ProblemShape {
    pub fn new(m: usize, n: usize, k: usize) -> Self {
        Self {
            m,
            n,
            k,
            layout: Layout::default(),
        }
    }

    pub fn square(n: usize) -> Self {
        Self::new(n, n, n)
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn flops(&self) -> u64 {
        2 * self.m as u64 * self.n as u64 * self.k as u64
    }

    /// Row/column counts of the stored A operand.
    pub fn lhs_dims(&self) -> (usize, usize) {
        if self.layout.transpose_a {
            (self.k, self.m)
        } else {
            (self.m, self.k)
        }
    }

    /// Row/column counts of the stored B operand.
    pub fn rhs_dims(&self) -> (usize, usize) {
        if self.layout.transpose_b {
            (self.n, self.k)
        } else {
            (self.k, self.n)
        }
    }
}

impl fmt::Display for ProblemShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "M={} N={} K={}{}{}",
            self.m,
            self.n,
            self.k,
            if self.layout.transpose_a { " A^T" } else { "" },
            if self.layout.transpose_b { " B^T" } else { "" }
        )
    }
}

/// The three tunable dimensions of the kernel family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KernelParams {
    pub group_size: usize,
    pub block_height: usize,
    pub extra_param: usize,
}

impl KernelParams {
    pub fn new(group_size: usize, block_height: usize, extra_param: usize) -> Self {
        Self {
            group_size,
            block_height,
            extra_param,
        }
    }
}

impl fmt::Display for KernelParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "group={} block={} extra={}",
            self.group_size, self.block_height, self.extra_param
        )
    }
}

/// A validated kernel configuration.
///
/// `values` is the kernel family's own encoding of the parameters. The search
/// never interprets it; only the family that produced it can decode it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Configuration {
    pub shape: ProblemShape,
    pub values: Vec<usize>,
}

impl Configuration {
    pub fn new(shape: ProblemShape, values: Vec<usize>) -> Self {
        Self { shape, values }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        write!(f, "[{}]", values.join(" "))
    }
}

/// Best measured configuration for one problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelProfile {
    pub kernel: String,
    pub configuration: Configuration,
    pub average_time_us: f64,
    pub gflops: f64,
}

impl KernelProfile {
    pub fn new(kernel: &str, configuration: Configuration, average_time_us: f64) -> Self {
        let gflops = if average_time_us > 0.0 {
            configuration.shape.flops() as f64 / (average_time_us * 1.0e3)
        } else {
            0.0
        };

        Self {
            kernel: kernel.to_string(),
            configuration,
            average_time_us,
            gflops,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transposed_operands_swap_stored_dims() {
        let shape = ProblemShape::new(8, 12, 16).with_layout(Layout::new(true, true));
        assert_eq!(shape.lhs_dims(), (16, 8));
        assert_eq!(shape.rhs_dims(), (12, 16));
    }

    #[test]
    fn profile_reports_gflops() {
        let shape = ProblemShape::square(100);
        let profile = KernelProfile::new("tiled", Configuration::new(shape, vec![1]), 1000.0);
        // 2e6 flops in 1ms
        assert!((profile.gflops - 2.0).abs() < 1e-9);
    }

    #[test]
    fn configuration_serialization() {
        let config = Configuration::new(ProblemShape::square(64), vec![8, 4, 4, 1, 0, 0]);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Configuration = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
        assert_eq!(config.to_string(), "[8 4 4 1 0 0]");
    }
}
