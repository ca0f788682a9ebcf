//! CPU backend for gemmtune: the host device and its trial executor.

pub mod device;
pub mod runtime;

pub use device::*;
pub use runtime::*;
