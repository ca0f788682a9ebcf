//! Parameterized matrix-multiply kernels tuned by gemmtune.

pub mod config;
pub mod matmul;
pub mod utils;

pub use config::*;
pub use matmul::*;
pub use utils::*;
