//! Autotuning search for parameterized matmul kernels.
//!
//! A tuning run enumerates candidate configurations ([`space`]), benchmarks
//! them over several trial rounds while pruning slow candidates
//! ([`bench`], [`prune`]), and optionally refines the winner of a cheap broad
//! pass with a focused second pass ([`tuner`]).

pub mod bench;
pub mod cache;
pub mod executor;
pub mod prune;
pub mod report;
pub mod space;
pub mod stats;
pub mod tuner;

pub use bench::*;
pub use cache::*;
pub use executor::*;
pub use prune::*;
pub use report::*;
pub use space::*;
pub use stats::*;
pub use tuner::*;
