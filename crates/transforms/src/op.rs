//! Operator abstraction: kinds, parameter sets, records, the trait.

use anyhow::Result;
use looptune_ir::{CompileContext, IrState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformKind {
    Tiling,
    Interchange,
    Parallelization,
    Vectorization,
}

impl TransformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformKind::Tiling => "tiling",
            TransformKind::Interchange => "interchange",
            TransformKind::Parallelization => "parallelization",
            TransformKind::Vectorization => "vectorization",
        }
    }
}

/// Chosen parameters for one application of an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamSet {
    /// One tile size per dimension, outermost first; 1 leaves a dimension
    /// untouched.
    Tiling { tile_sizes: Vec<u64> },
    /// Reordering of the nest: `permutation[p]` is the original index of
    /// the dimension placed at position `p`.
    Interchange { permutation: Vec<usize> },
    /// Dimension indices marked for parallel execution.
    Parallelization { dims: Vec<usize> },
    /// Target dimension index plus vector width.
    Vectorization { dim: usize, width: u64 },
}

impl ParamSet {
    pub fn kind(&self) -> TransformKind {
        match self {
            ParamSet::Tiling { .. } => TransformKind::Tiling,
            ParamSet::Interchange { .. } => TransformKind::Interchange,
            ParamSet::Parallelization { .. } => TransformKind::Parallelization,
            ParamSet::Vectorization { .. } => TransformKind::Vectorization,
        }
    }
}

/// One applied transformation; immutable once attached to a history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRecord {
    pub kind: TransformKind,
    pub params: ParamSet,
}

impl TransformRecord {
    pub fn new(params: ParamSet) -> Self {
        Self {
            kind: params.kind(),
            params,
        }
    }
}

/// Vector widths the execution target supports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetInfo {
    pub vector_widths: Vec<u64>,
}

impl Default for TargetInfo {
    fn default() -> Self {
        Self {
            vector_widths: vec![4, 8, 16],
        }
    }
}

/// A transformation operator: enumerate the legal parameter sets for a
/// state, and apply one to derive a successor.
///
/// Enumeration is fail-closed: `apply` succeeds for every parameter set the
/// same operator enumerated for that state, and errors only when handed
/// parameters that violate its legality predicate. Each operator offers
/// nothing once its kind already appears in `history`, which keeps every
/// parameter space finite and the search terminating.
pub trait TransformOp: Send + Sync {
    fn kind(&self) -> TransformKind;

    fn enumerate(&self, state: &IrState, history: &[TransformRecord]) -> Vec<ParamSet>;

    fn apply(&self, state: &IrState, params: &ParamSet) -> Result<IrState>;
}

pub(crate) fn already_applied(kind: TransformKind, history: &[TransformRecord]) -> bool {
    history.iter().any(|record| record.kind == kind)
}

/// The standard operator set, in a fixed enumeration order.
pub fn default_operators(
    ctx: Arc<CompileContext>,
    target: TargetInfo,
) -> Vec<Box<dyn TransformOp>> {
    vec![
        Box::new(crate::tiling::TilingOp::new(Arc::clone(&ctx))),
        Box::new(crate::interchange::InterchangeOp::new(Arc::clone(&ctx))),
        Box::new(crate::parallelize::ParallelizationOp::new(Arc::clone(&ctx))),
        Box::new(crate::vectorize::VectorizationOp::new(ctx, target)),
    ]
}
