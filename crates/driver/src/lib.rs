//! LoopTune driver facade.

#[cfg(feature = "cli")]
pub mod cli;
pub mod report;
pub mod session;

#[cfg(feature = "cli")]
pub use cli::*;
pub use report::*;
pub use session::*;
