//! Deterministic analytic cost model.
//!
//! Stand-in evaluator for dry runs and for tests that need a fixed cost
//! surface: no compilation, no measurement noise, identical inputs always
//! produce identical costs.

use crate::evaluator::{Cost, Evaluator, ExecutionFailure};
use looptune_ir::IrState;
use tracing::debug;

pub struct CostModelEvaluator {
    ns_per_iteration: f64,
}

impl CostModelEvaluator {
    pub fn new(ns_per_iteration: f64) -> Self {
        Self { ns_per_iteration }
    }
}

impl Default for CostModelEvaluator {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Evaluator for CostModelEvaluator {
    fn evaluate(&self, state: &IrState) -> Result<Cost, ExecutionFailure> {
        let nest = state.nest();
        let mut cost_ns = nest.total_iterations() as f64 * self.ns_per_iteration;

        for dim in nest.dims() {
            if dim.tile.is_some() {
                // Cache reuse within a tile.
                cost_ns *= 0.85;
            }
            if dim.parallel {
                cost_ns /= 3.0;
            }
            if let Some(width) = dim.vector_width {
                cost_ns /= (width as f64) / 2.0;
            }
        }
        if nest.innermost().is_some_and(|dim| dim.unit_stride) {
            // Contiguous innermost accesses.
            cost_ns *= 0.8;
        }

        let cost_ms = cost_ns / 1.0e6;
        debug!(function = state.function(), cost_ms, "modeled candidate");
        Ok(cost_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use looptune_ir::{three_loop_matmul, CompileContext};

    #[test]
    fn model_is_deterministic() {
        let ctx = CompileContext::new();
        let state = ctx
            .root_state(three_loop_matmul("mm", 64, 64, 64).unwrap())
            .unwrap();
        let model = CostModelEvaluator::default();
        let a = model.evaluate(&state).unwrap();
        let b = model.evaluate(&state).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn schedule_marks_reduce_cost() {
        let ctx = CompileContext::new();
        let state = ctx
            .root_state(three_loop_matmul("mm", 64, 64, 64).unwrap())
            .unwrap();
        let model = CostModelEvaluator::default();
        let baseline = model.evaluate(&state).unwrap();

        let mut nest = state.nest().clone();
        nest.dims_mut()[0].parallel = true;
        nest.dims_mut()[2].vector_width = Some(8);
        let tuned = ctx.derive_state(&state, nest).unwrap();
        assert!(model.evaluate(&tuned).unwrap() < baseline);
    }
}
