//! End-to-end behavior of the beam search on small, fully controlled
//! kernels.

use looptune_eval::{Cost, CostModelEvaluator, Evaluator, ExecutionFailure};
use looptune_ir::{CompileContext, IrState, KernelBuilder, LoopDim};
use looptune_search::{BeamSearch, SearchConfig, SearchMethod};
use looptune_transforms::{
    InterchangeOp, ParallelizationOp, TargetInfo, TilingOp, TransformOp, VectorizationOp,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 3-d nest where i is dependence-free, j and k carry dependences, k is
/// the unit-stride reduction, and j must stay outside k. With tile
/// candidates {16, 32} and vector width {8} the operators offer exactly
/// 2 + 2 + 1 + 1 parameter sets at the root.
fn fixture(ctx: &Arc<CompileContext>) -> IrState {
    let spec = KernelBuilder::new("kernel3d")
        .loop_dim(LoopDim::new("i", 64))
        .loop_dim(LoopDim::new("j", 64).with_dependence())
        .loop_dim(LoopDim::new("k", 64).with_dependence().with_unit_stride())
        .ordering_constraint("j", "k")
        .finish()
        .unwrap();
    ctx.root_state(spec).unwrap()
}

fn fixture_operators(ctx: &Arc<CompileContext>) -> Vec<Box<dyn TransformOp>> {
    vec![
        Box::new(TilingOp::with_candidates(Arc::clone(ctx), vec![16, 32])),
        Box::new(InterchangeOp::new(Arc::clone(ctx))),
        Box::new(ParallelizationOp::new(Arc::clone(ctx))),
        Box::new(VectorizationOp::new(
            Arc::clone(ctx),
            TargetInfo {
                vector_widths: vec![8],
            },
        )),
    ]
}

fn engine(
    ctx: &Arc<CompileContext>,
    config: SearchConfig,
    evaluator: Arc<dyn Evaluator>,
) -> BeamSearch {
    BeamSearch::new(
        config,
        Arc::clone(ctx),
        "kernel3d",
        fixture_operators(ctx),
        evaluator,
    )
    .unwrap()
}

fn config(beam_size: usize) -> SearchConfig {
    SearchConfig {
        beam_size,
        max_depth: 4,
        eval_budget: 10_000,
        per_candidate_timeout: Duration::from_secs(5),
    }
}

/// Cost-model evaluator that also records every score it hands out.
struct RecordingEvaluator {
    inner: CostModelEvaluator,
    seen: Mutex<Vec<Cost>>,
}

impl RecordingEvaluator {
    fn new() -> Self {
        Self {
            inner: CostModelEvaluator::default(),
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl Evaluator for RecordingEvaluator {
    fn evaluate(&self, state: &IrState) -> Result<Cost, ExecutionFailure> {
        let cost = self.inner.evaluate(state)?;
        self.seen.lock().unwrap().push(cost);
        Ok(cost)
    }
}

/// Evaluator that fails for every state except the untransformed root.
struct TransformedAlwaysFails {
    baseline_text: String,
    baseline_cost: Cost,
}

impl Evaluator for TransformedAlwaysFails {
    fn evaluate(&self, state: &IrState) -> Result<Cost, ExecutionFailure> {
        if state.module_text() == self.baseline_text {
            Ok(self.baseline_cost)
        } else {
            Err(ExecutionFailure::Crash {
                exit_code: Some(1),
                detail: "transformed kernel crashed".into(),
            })
        }
    }
}

#[test]
fn scenario_a_explores_and_improves() {
    let ctx = Arc::new(CompileContext::new());
    let root = fixture(&ctx);
    let baseline = CostModelEvaluator::default().evaluate(&root).unwrap();

    let mut search = engine(&ctx, config(2), Arc::new(CostModelEvaluator::default()));
    let result = search.search(&root).unwrap();

    assert!(result.score <= baseline);
    assert!(!result.history.is_empty() && result.history.len() <= 4);
    assert!(result.stats.generations <= 4);
    assert_eq!(result.baseline_score, baseline);
}

#[test]
fn scenario_b_all_candidates_fail_returns_root() {
    let ctx = Arc::new(CompileContext::new());
    let root = fixture(&ctx);
    let evaluator = TransformedAlwaysFails {
        baseline_text: root.module_text().to_string(),
        baseline_cost: 12.5,
    };

    let mut search = engine(&ctx, config(2), Arc::new(evaluator));
    let result = search.search(&root).unwrap();

    assert!(!result.improved());
    assert_eq!(result.score, 12.5);
    // The whole first generation was materialized and reported as failed.
    assert_eq!(result.stats.generations, 1);
    assert_eq!(result.stats.failures, 6);
}

#[test]
fn scenario_c_budget_of_one_evaluates_only_root() {
    let ctx = Arc::new(CompileContext::new());
    let root = fixture(&ctx);
    let mut search = engine(
        &ctx,
        SearchConfig {
            eval_budget: 1,
            ..config(2)
        },
        Arc::new(CostModelEvaluator::default()),
    );
    let result = search.search(&root).unwrap();

    assert_eq!(result.stats.evaluated, 1);
    assert_eq!(result.stats.generations, 0);
    assert!(!result.improved());
}

#[test]
fn scenario_d_identical_runs_return_identical_schedules() {
    let ctx = Arc::new(CompileContext::new());
    let root = fixture(&ctx);

    let mut first = engine(&ctx, config(2), Arc::new(CostModelEvaluator::default()));
    let mut second = engine(&ctx, config(2), Arc::new(CostModelEvaluator::default()));

    let a = first.search(&root).unwrap();
    let b = second.search(&root).unwrap();

    assert_eq!(a.history, b.history);
    assert_eq!(a.score, b.score);
    assert_eq!(a.stats.evaluated, b.stats.evaluated);
}

#[test]
fn depth_bound_limits_schedule_length() {
    let ctx = Arc::new(CompileContext::new());
    let root = fixture(&ctx);
    let mut search = engine(
        &ctx,
        SearchConfig {
            max_depth: 2,
            ..config(2)
        },
        Arc::new(CostModelEvaluator::default()),
    );
    let result = search.search(&root).unwrap();
    assert!(result.history.len() <= 2);
    assert!(result.stats.generations <= 2);
}

#[test]
fn beam_width_bounds_per_generation_work() {
    let ctx = Arc::new(CompileContext::new());
    let root = fixture(&ctx);
    let mut search = engine(&ctx, config(1), Arc::new(CostModelEvaluator::default()));
    let result = search.search(&root).unwrap();
    // A width-1 frontier offers at most 6 children per generation over at
    // most 4 generations, plus the root.
    assert!(result.stats.evaluated <= 1 + 4 * 6);
}

#[test]
fn global_best_is_the_minimum_over_every_evaluated_node() {
    let ctx = Arc::new(CompileContext::new());
    let root = fixture(&ctx);
    let recorder = Arc::new(RecordingEvaluator::new());

    // Width 1 forces heavy pruning, so most evaluated nodes never reach a
    // frontier again.
    let recorder_handle: Arc<dyn Evaluator> = recorder.clone();
    let mut search = engine(&ctx, config(1), recorder_handle);
    let result = search.search(&root).unwrap();

    let seen = recorder.seen.lock().unwrap();
    assert_eq!(seen.len(), result.stats.evaluated);
    let minimum = seen.iter().copied().fold(f64::INFINITY, f64::min);
    assert_eq!(result.score, minimum);
}

#[test]
fn frontier_never_exceeds_the_beam_width() {
    let ctx = Arc::new(CompileContext::new());
    let root = fixture(&ctx);

    // The root offers 6 viable candidates, so a width-2 beam is saturated.
    let mut wide = engine(&ctx, config(2), Arc::new(CostModelEvaluator::default()));
    let result = wide.search(&root).unwrap();
    assert_eq!(result.stats.max_frontier, 2);

    let mut narrow = engine(&ctx, config(1), Arc::new(CostModelEvaluator::default()));
    let result = narrow.search(&root).unwrap();
    assert_eq!(result.stats.max_frontier, 1);
}

#[test]
fn no_legal_transformations_terminates_at_root() {
    let ctx = Arc::new(CompileContext::new());
    let root = fixture(&ctx);
    let baseline = CostModelEvaluator::default().evaluate(&root).unwrap();
    let mut search = BeamSearch::new(
        config(2),
        Arc::clone(&ctx),
        "kernel3d",
        Vec::new(),
        Arc::new(CostModelEvaluator::default()),
    )
    .unwrap();
    let result = search.search(&root).unwrap();

    assert_eq!(result.stats.generations, 0);
    assert_eq!(result.score, baseline);
    assert!(!result.improved());
}

#[test]
fn operators_are_fail_closed_on_the_fixture() {
    let ctx = Arc::new(CompileContext::new());
    let root = fixture(&ctx);
    for op in fixture_operators(&ctx) {
        for params in op.enumerate(&root, &[]) {
            let child = op.apply(&root, &params).unwrap();
            assert!(child.nest().validate().is_ok());
        }
    }
}

#[test]
fn fixture_offers_the_expected_parameter_counts() {
    let ctx = Arc::new(CompileContext::new());
    let root = fixture(&ctx);
    let counts: Vec<usize> = fixture_operators(&ctx)
        .iter()
        .map(|op| op.enumerate(&root, &[]).len())
        .collect();
    assert_eq!(counts, vec![2, 2, 1, 1]);
}
