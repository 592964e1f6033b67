//! Loop tiling.

use crate::op::{already_applied, ParamSet, TransformKind, TransformOp, TransformRecord};
use anyhow::{bail, Result};
use looptune_ir::{CompileContext, IrState, LoopNest};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_TILE_CANDIDATES: &[u64] = &[16, 32, 64];

pub struct TilingOp {
    ctx: Arc<CompileContext>,
    candidates: Vec<u64>,
}

impl TilingOp {
    pub fn new(ctx: Arc<CompileContext>) -> Self {
        Self::with_candidates(ctx, DEFAULT_TILE_CANDIDATES.to_vec())
    }

    pub fn with_candidates(ctx: Arc<CompileContext>, candidates: Vec<u64>) -> Self {
        Self { ctx, candidates }
    }

    /// Tile sizes per dimension for candidate size `size`: `size` where the
    /// iteration space divides evenly and the dimension is worth splitting,
    /// 1 elsewhere. Returns None when nothing would be tiled.
    fn tile_vector(&self, nest: &LoopNest, size: u64) -> Option<Vec<u64>> {
        let sizes: Vec<u64> = nest
            .dims()
            .iter()
            .map(|dim| {
                if dim.tile.is_none() && dim.trip_count > size && dim.trip_count % size == 0 {
                    size
                } else {
                    1
                }
            })
            .collect();
        sizes.iter().any(|&s| s > 1).then_some(sizes)
    }

    fn check_legal(&self, nest: &LoopNest, tile_sizes: &[u64]) -> Result<()> {
        if tile_sizes.len() != nest.len() {
            bail!(
                "tiling expects {} tile sizes, got {}",
                nest.len(),
                tile_sizes.len()
            );
        }
        for (dim, &size) in nest.dims().iter().zip(tile_sizes) {
            if size == 0 {
                bail!("tile size 0 for dimension {}", dim.name);
            }
            if size == 1 {
                continue;
            }
            if dim.tile.is_some() {
                bail!("dimension {} is already tiled", dim.name);
            }
            if size >= dim.trip_count || dim.trip_count % size != 0 {
                bail!(
                    "tile size {} does not divide trip count {} of dimension {}",
                    size,
                    dim.trip_count,
                    dim.name
                );
            }
        }
        Ok(())
    }
}

impl TransformOp for TilingOp {
    fn kind(&self) -> TransformKind {
        TransformKind::Tiling
    }

    fn enumerate(&self, state: &IrState, history: &[TransformRecord]) -> Vec<ParamSet> {
        if already_applied(self.kind(), history) {
            return Vec::new();
        }
        let nest = state.nest();
        let sets: Vec<ParamSet> = self
            .candidates
            .iter()
            .filter_map(|&size| self.tile_vector(nest, size))
            .map(|tile_sizes| ParamSet::Tiling { tile_sizes })
            .collect();
        debug!(
            function = state.function(),
            candidates = sets.len(),
            "enumerated tilings"
        );
        sets
    }

    fn apply(&self, state: &IrState, params: &ParamSet) -> Result<IrState> {
        let ParamSet::Tiling { tile_sizes } = params else {
            bail!("tiling operator received {:?} parameters", params.kind());
        };
        self.check_legal(state.nest(), tile_sizes)?;

        let mut nest = state.nest().clone();
        for (dim, &size) in nest.dims_mut().iter_mut().zip(tile_sizes) {
            if size > 1 {
                dim.tile = Some(size);
            }
        }
        self.ctx.derive_state(state, nest)
    }
}
