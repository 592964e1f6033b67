//! Loop interchange.

use crate::op::{already_applied, ParamSet, TransformKind, TransformOp, TransformRecord};
use anyhow::{bail, Result};
use looptune_ir::{CompileContext, IrState};
use std::sync::Arc;
use tracing::debug;

/// Nests wider than this fall back to adjacent swaps instead of full
/// permutation enumeration.
const FULL_PERMUTATION_LIMIT: usize = 4;

pub struct InterchangeOp {
    ctx: Arc<CompileContext>,
}

impl InterchangeOp {
    pub fn new(ctx: Arc<CompileContext>) -> Self {
        Self { ctx }
    }
}

impl TransformOp for InterchangeOp {
    fn kind(&self) -> TransformKind {
        TransformKind::Interchange
    }

    fn enumerate(&self, state: &IrState, history: &[TransformRecord]) -> Vec<ParamSet> {
        if already_applied(self.kind(), history) {
            return Vec::new();
        }
        let nest = state.nest();
        let n = nest.len();
        if n < 2 {
            return Vec::new();
        }

        let candidates = if n <= FULL_PERMUTATION_LIMIT {
            permutations(n)
        } else {
            adjacent_swaps(n)
        };

        let identity: Vec<usize> = (0..n).collect();
        let sets: Vec<ParamSet> = candidates
            .into_iter()
            .filter(|perm| *perm != identity && nest.permutation_is_legal(perm))
            .map(|permutation| ParamSet::Interchange { permutation })
            .collect();
        debug!(
            function = state.function(),
            candidates = sets.len(),
            "enumerated interchanges"
        );
        sets
    }

    fn apply(&self, state: &IrState, params: &ParamSet) -> Result<IrState> {
        let ParamSet::Interchange { permutation } = params else {
            bail!("interchange operator received {:?} parameters", params.kind());
        };
        if !state.nest().permutation_is_legal(permutation) {
            bail!(
                "permutation {:?} violates dependence ordering of @{}",
                permutation,
                state.function()
            );
        }
        let nest = state.nest().permuted(permutation);
        self.ctx.derive_state(state, nest)
    }
}

/// All permutations of `0..n` in lexicographic order.
fn permutations(n: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    let mut current = Vec::with_capacity(n);
    let mut used = vec![false; n];
    build(n, &mut current, &mut used, &mut out);
    out
}

fn build(n: usize, current: &mut Vec<usize>, used: &mut [bool], out: &mut Vec<Vec<usize>>) {
    if current.len() == n {
        out.push(current.clone());
        return;
    }
    for index in 0..n {
        if !used[index] {
            used[index] = true;
            current.push(index);
            build(n, current, used, out);
            current.pop();
            used[index] = false;
        }
    }
}

fn adjacent_swaps(n: usize) -> Vec<Vec<usize>> {
    (0..n - 1)
        .map(|position| {
            let mut perm: Vec<usize> = (0..n).collect();
            perm.swap(position, position + 1);
            perm
        })
        .collect()
}
