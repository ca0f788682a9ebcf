//! gemmtune driver: option validation, tuning sessions and the CLI.

#[cfg(feature = "cli")]
pub mod cli;
pub mod options;
pub mod session;

#[cfg(feature = "cli")]
pub use cli::*;
pub use options::*;
pub use session::*;
