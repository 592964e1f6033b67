//! LoopTune intermediate representation utilities.

pub mod builder;
pub mod context;
pub mod nest;
pub mod state;

pub use builder::*;
pub use context::*;
pub use nest::*;
pub use state::*;
