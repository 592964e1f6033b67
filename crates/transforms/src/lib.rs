//! Structural transformation operators for LoopTune.
//!
//! Each operator answers two questions for a given IR state: which
//! parameter sets are legal, and what state results from applying one.
//! They know nothing about search strategy.

pub mod interchange;
pub mod op;
pub mod parallelize;
pub mod tiling;
pub mod vectorize;

pub use interchange::InterchangeOp;
pub use op::{
    default_operators, ParamSet, TargetInfo, TransformKind, TransformOp, TransformRecord,
};
pub use parallelize::ParallelizationOp;
pub use tiling::TilingOp;
pub use vectorize::VectorizationOp;
