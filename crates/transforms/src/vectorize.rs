//! Loop vectorization.

use crate::op::{
    already_applied, ParamSet, TargetInfo, TransformKind, TransformOp, TransformRecord,
};
use anyhow::{bail, Result};
use looptune_ir::{CompileContext, IrState};
use std::sync::Arc;
use tracing::debug;

pub struct VectorizationOp {
    ctx: Arc<CompileContext>,
    target: TargetInfo,
}

impl VectorizationOp {
    pub fn new(ctx: Arc<CompileContext>, target: TargetInfo) -> Self {
        Self { ctx, target }
    }

    fn check_legal(&self, state: &IrState, dim_index: usize, width: u64) -> Result<()> {
        let nest = state.nest();
        let Some(dim) = nest.dims().get(dim_index) else {
            bail!("dimension index {} out of range", dim_index);
        };
        if !dim.unit_stride {
            bail!(
                "dimension {} has non-unit-stride access and cannot be vectorized",
                dim.name
            );
        }
        if dim.vector_width.is_some() {
            bail!("dimension {} is already vectorized", dim.name);
        }
        if !self.target.vector_widths.contains(&width) {
            bail!("vector width {} is unsupported by the target", width);
        }
        let effective = dim.tile.unwrap_or(dim.trip_count);
        if width >= effective || effective % width != 0 {
            bail!(
                "vector width {} does not divide the {} iterations of dimension {}",
                width,
                effective,
                dim.name
            );
        }
        Ok(())
    }
}

impl TransformOp for VectorizationOp {
    fn kind(&self) -> TransformKind {
        TransformKind::Vectorization
    }

    fn enumerate(&self, state: &IrState, history: &[TransformRecord]) -> Vec<ParamSet> {
        if already_applied(self.kind(), history) {
            return Vec::new();
        }
        let mut sets = Vec::new();
        for (index, _) in state.nest().dims().iter().enumerate() {
            for &width in &self.target.vector_widths {
                if self.check_legal(state, index, width).is_ok() {
                    sets.push(ParamSet::Vectorization { dim: index, width });
                }
            }
        }
        debug!(
            function = state.function(),
            candidates = sets.len(),
            "enumerated vectorizations"
        );
        sets
    }

    fn apply(&self, state: &IrState, params: &ParamSet) -> Result<IrState> {
        let ParamSet::Vectorization { dim, width } = params else {
            bail!(
                "vectorization operator received {:?} parameters",
                params.kind()
            );
        };
        self.check_legal(state, *dim, *width)?;

        let mut nest = state.nest().clone();
        nest.dims_mut()[*dim].vector_width = Some(*width);
        self.ctx.derive_state(state, nest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use looptune_ir::three_loop_matmul;

    fn op(ctx: &Arc<CompileContext>, widths: Vec<u64>) -> VectorizationOp {
        VectorizationOp::new(
            Arc::clone(ctx),
            TargetInfo {
                vector_widths: widths,
            },
        )
    }

    #[test]
    fn enumerates_unit_stride_dimensions_only() {
        let ctx = Arc::new(CompileContext::new());
        // Only k is unit stride.
        let state = ctx
            .root_state(three_loop_matmul("mm", 32, 32, 64).unwrap())
            .unwrap();
        let sets = op(&ctx, vec![4, 8]).enumerate(&state, &[]);
        assert_eq!(
            sets,
            vec![
                ParamSet::Vectorization { dim: 2, width: 4 },
                ParamSet::Vectorization { dim: 2, width: 8 },
            ]
        );
    }

    #[test]
    fn width_must_divide_iterations() {
        let ctx = Arc::new(CompileContext::new());
        let state = ctx
            .root_state(three_loop_matmul("mm", 32, 32, 20).unwrap())
            .unwrap();
        // 8 does not divide 20; 4 does.
        let sets = op(&ctx, vec![4, 8]).enumerate(&state, &[]);
        assert_eq!(sets, vec![ParamSet::Vectorization { dim: 2, width: 4 }]);
    }

    #[test]
    fn apply_sets_width_and_rejects_unsupported() {
        let ctx = Arc::new(CompileContext::new());
        let state = ctx
            .root_state(three_loop_matmul("mm", 32, 32, 64).unwrap())
            .unwrap();
        let vectorize = op(&ctx, vec![8]);
        let child = vectorize
            .apply(&state, &ParamSet::Vectorization { dim: 2, width: 8 })
            .unwrap();
        assert_eq!(child.nest().dims()[2].vector_width, Some(8));

        let err = vectorize
            .apply(&state, &ParamSet::Vectorization { dim: 2, width: 32 })
            .unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }
}
