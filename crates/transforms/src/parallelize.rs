//! Loop parallelization.

use crate::op::{already_applied, ParamSet, TransformKind, TransformOp, TransformRecord};
use anyhow::{bail, Result};
use looptune_ir::{CompileContext, IrState};
use std::sync::Arc;
use tracing::debug;

/// Marks dependence-free dimensions for parallel execution. The enumerated
/// subsets are outermost contiguous prefixes of the nest, the shape a
/// collapsed parallel loop header can express.
pub struct ParallelizationOp {
    ctx: Arc<CompileContext>,
}

impl ParallelizationOp {
    pub fn new(ctx: Arc<CompileContext>) -> Self {
        Self { ctx }
    }

    fn check_legal(&self, state: &IrState, dims: &[usize]) -> Result<()> {
        if dims.is_empty() {
            bail!("parallelization requires at least one dimension");
        }
        let nest = state.nest();
        for &index in dims {
            let Some(dim) = nest.dims().get(index) else {
                bail!("dimension index {} out of range", index);
            };
            if dim.carries_dependence {
                bail!(
                    "dimension {} carries a dependence and cannot run in parallel",
                    dim.name
                );
            }
            if dim.parallel {
                bail!("dimension {} is already parallel", dim.name);
            }
        }
        Ok(())
    }
}

impl TransformOp for ParallelizationOp {
    fn kind(&self) -> TransformKind {
        TransformKind::Parallelization
    }

    fn enumerate(&self, state: &IrState, history: &[TransformRecord]) -> Vec<ParamSet> {
        if already_applied(self.kind(), history) {
            return Vec::new();
        }
        let nest = state.nest();
        let mut prefix = Vec::new();
        let mut sets = Vec::new();
        for (index, dim) in nest.dims().iter().enumerate() {
            if dim.carries_dependence || dim.parallel {
                break;
            }
            prefix.push(index);
            sets.push(ParamSet::Parallelization {
                dims: prefix.clone(),
            });
        }
        debug!(
            function = state.function(),
            candidates = sets.len(),
            "enumerated parallelizations"
        );
        sets
    }

    fn apply(&self, state: &IrState, params: &ParamSet) -> Result<IrState> {
        let ParamSet::Parallelization { dims } = params else {
            bail!(
                "parallelization operator received {:?} parameters",
                params.kind()
            );
        };
        self.check_legal(state, dims)?;

        let mut nest = state.nest().clone();
        for &index in dims {
            nest.dims_mut()[index].parallel = true;
        }
        self.ctx.derive_state(state, nest)
    }
}
