//! Shared helpers for kernel implementations.

use crate::config::ProblemShape;
use crate::matmul::MatmulInputs;
use anyhow::{bail, Result};
use ndarray::{Array2, ArrayView2, Axis};

pub fn validate_matmul_inputs(shape: &ProblemShape, inputs: &MatmulInputs<'_>) -> Result<()> {
    if inputs.lhs.dim() != shape.lhs_dims() {
        bail!(
            "lhs is {}x{} but {} stores it as {}x{}",
            inputs.lhs.nrows(),
            inputs.lhs.ncols(),
            shape,
            shape.lhs_dims().0,
            shape.lhs_dims().1
        );
    }
    if inputs.rhs.dim() != shape.rhs_dims() {
        bail!(
            "rhs is {}x{} but {} stores it as {}x{}",
            inputs.rhs.nrows(),
            inputs.rhs.ncols(),
            shape,
            shape.rhs_dims().0,
            shape.rhs_dims().1
        );
    }
    Ok(())
}

/// Reproducible operand data in `[1, 2)`, in steps of 1/16.
pub fn deterministic_tensor(rows: usize, cols: usize) -> Array2<f32> {
    let mut tensor = Array2::zeros((rows, cols));
    tensor
        .axis_iter_mut(Axis(0))
        .enumerate()
        .for_each(|(row_idx, mut row)| {
            row.iter_mut().enumerate().for_each(|(col_idx, value)| {
                let seed = ((row_idx * 1313) ^ (col_idx * 7331)) % 16;
                *value = 1.0 + seed as f32 / 16.0;
            });
        });
    tensor
}

pub fn max_abs_error(output: &ArrayView2<'_, f32>, expected: &ArrayView2<'_, f32>) -> f64 {
    if output.dim() != expected.dim() {
        return f64::INFINITY;
    }
    output
        .iter()
        .zip(expected.iter())
        .fold(0.0_f64, |acc, (a, b)| acc.max((a - b).abs() as f64))
}

/// Tolerance for an f32 dot product of length `k` over operands in `[1, 2)`.
pub fn dot_tolerance(k: usize) -> f64 {
    1.0e-5 * (k.max(1) as f64) * 4.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_tensor_is_reproducible() {
        let a = deterministic_tensor(5, 7);
        let b = deterministic_tensor(5, 7);
        assert_eq!(a, b);
        assert!(a.iter().all(|v| (1.0..2.0).contains(v)));
    }

    #[test]
    fn deterministic_tensor_stays_below_two_on_large_operands() {
        let t = deterministic_tensor(64, 256);
        assert!(t.iter().all(|v| (1.0..2.0).contains(v)));
        // sixteenths keep every product and partial sum exact in f32
        assert!(t.iter().all(|v| (v * 16.0).fract() == 0.0));
        assert!(t.iter().any(|v| *v == 1.9375));
    }

    #[test]
    fn mismatched_shapes_are_infinitely_wrong() {
        let a = Array2::<f32>::zeros((2, 2));
        let b = Array2::<f32>::zeros((2, 3));
        assert!(max_abs_error(&a.view(), &b.view()).is_infinite());
        assert_eq!(max_abs_error(&a.view(), &a.view()), 0.0);
    }

    #[test]
    fn rejects_misshapen_operands() {
        let shape = ProblemShape::new(4, 8, 12);
        let lhs = Array2::<f32>::zeros((4, 12));
        let rhs = Array2::<f32>::zeros((8, 12));
        let inputs = MatmulInputs::new(lhs.view(), rhs.view());
        assert!(validate_matmul_inputs(&shape, &inputs).is_err());
    }
}
