//! Width-bounded beam search over transformation schedules.
//!
//! Expansion is serial: every derived state goes through the single-writer
//! compile context. Evaluation is the expensive stage and runs on the
//! rayon pool; the parallel iterator's completion is the generation
//! barrier, so pruning never sees an unscored candidate. A failed
//! candidate is kept with the sentinel score for diagnostics but can
//! neither win nor be expanded, and never disturbs its siblings.

use crate::config::SearchConfig;
use crate::method::{SearchMethod, SearchResult, SearchStats};
use crate::node::{Node, NodeArena, NodeId};
use anyhow::{bail, Result};
use looptune_eval::{Cost, Evaluator, UNUSABLE};
use looptune_ir::{CompileContext, IrState};
use looptune_transforms::{TransformOp, TransformRecord};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub struct BeamSearch {
    config: SearchConfig,
    ctx: Arc<CompileContext>,
    function: String,
    operators: Vec<Box<dyn TransformOp>>,
    evaluator: Arc<dyn Evaluator>,
}

impl BeamSearch {
    pub fn new(
        config: SearchConfig,
        ctx: Arc<CompileContext>,
        function: impl Into<String>,
        operators: Vec<Box<dyn TransformOp>>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Result<Self> {
        if let Err(reason) = config.validate() {
            bail!("invalid search config: {}", reason);
        }
        Ok(Self {
            config,
            ctx,
            function: function.into(),
            operators,
            evaluator,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Expand one frontier node through every operator. Operators are
    /// fail-closed, so an `apply` error on an enumerated parameter set is
    /// a contract violation; it is logged and the candidate skipped rather
    /// than aborting the generation.
    fn expand_node(&self, arena: &NodeArena, id: NodeId, children: &mut Vec<Node>) {
        let node = arena.get(id);
        for op in &self.operators {
            for params in op.enumerate(&node.state, &node.history) {
                match op.apply(&node.state, &params) {
                    Ok(state) => {
                        let record = TransformRecord::new(params);
                        children.push(Node::child(id, node, state, record));
                    }
                    Err(err) => {
                        warn!(
                            operator = op.kind().as_str(),
                            error = %err,
                            "operator rejected its own enumerated parameters; skipping"
                        );
                    }
                }
            }
        }
    }

    fn score(&self, state: &IrState) -> (Cost, bool) {
        match self.evaluator.evaluate(state) {
            Ok(cost) => (cost, false),
            Err(failure) => {
                warn!(function = state.function(), failure = %failure, "candidate unusable");
                (UNUSABLE, true)
            }
        }
    }
}

impl SearchMethod for BeamSearch {
    fn name(&self) -> &str {
        "beam-search"
    }

    fn search(&mut self, root: &IrState) -> Result<SearchResult> {
        if root.function() != self.function {
            bail!(
                "root state is for @{} but the search targets @{}",
                root.function(),
                self.function
            );
        }

        let mut arena = NodeArena::new();
        let mut stats = SearchStats::default();

        let root_id = arena.push(0, Node::root(root.clone()));
        let (root_score, root_failed) = self.score(&arena.get(root_id).state);
        arena.get_mut(root_id).score = Some(root_score);
        stats.evaluated = 1;
        stats.failures += usize::from(root_failed);

        info!(
            function = %self.function,
            beam_size = self.config.beam_size,
            max_depth = self.config.max_depth,
            eval_budget = self.config.eval_budget,
            baseline_ms = root_score,
            "starting beam search"
        );

        let mut global_best = root_id;
        let mut frontier: Vec<NodeId> = if arena.get(root_id).is_viable() {
            vec![root_id]
        } else {
            Vec::new()
        };
        stats.max_frontier = frontier.len();

        let mut generation: u32 = 1;
        while !frontier.is_empty() && generation as usize <= self.config.max_depth {
            let remaining_budget = self.config.eval_budget - stats.evaluated;
            if remaining_budget == 0 {
                info!(generation, "evaluation budget exhausted");
                break;
            }

            // Expand serially; state derivation is single-writer.
            let mut children = Vec::new();
            for &id in &frontier {
                self.expand_node(&arena, id, &mut children);
            }
            if children.is_empty() {
                info!(generation, "no legal transformations remain");
                break;
            }

            // Budget exhaustion cancels the candidates past the limit, in
            // insertion order, and ends the search after this generation.
            let budget_exhausted = children.len() > remaining_budget;
            if budget_exhausted {
                warn!(
                    generation,
                    dropped = children.len() - remaining_budget,
                    "evaluation budget truncates this generation"
                );
                children.truncate(remaining_budget);
            }

            // Parallel evaluation; collecting is the generation barrier.
            let evaluator = Arc::clone(&self.evaluator);
            let scores: Vec<(Cost, bool)> = children
                .par_iter()
                .map(|child| match evaluator.evaluate(&child.state) {
                    Ok(cost) => (cost, false),
                    Err(failure) => {
                        warn!(
                            function = child.state.function(),
                            failure = %failure,
                            "candidate unusable"
                        );
                        (UNUSABLE, true)
                    }
                })
                .collect();

            let mut generation_ids = Vec::with_capacity(children.len());
            for (mut child, (cost, failed)) in children.into_iter().zip(scores) {
                child.score = Some(cost);
                stats.failures += usize::from(failed);
                generation_ids.push(arena.push(generation, child));
            }
            stats.evaluated += generation_ids.len();
            stats.generations = generation as usize;

            // Monotone global best; strict improvement keeps the earliest
            // node on ties for determinism.
            for &id in &generation_ids {
                let score = arena.get(id).score.unwrap_or(UNUSABLE);
                if score < arena.get(global_best).score.unwrap_or(UNUSABLE) {
                    global_best = id;
                }
            }

            info!(
                generation,
                candidates = generation_ids.len(),
                best_ms = arena.get(global_best).score.unwrap_or(UNUSABLE),
                "generation evaluated"
            );

            if budget_exhausted {
                break;
            }

            // Prune the current generation only: sentinel-scored nodes
            // stay in the arena but never re-enter the frontier.
            generation_ids.sort_by(|&a, &b| frontier_order(arena.get(a), arena.get(b)));
            frontier = generation_ids
                .into_iter()
                .filter(|&id| arena.get(id).is_viable())
                .take(self.config.beam_size)
                .collect();
            stats.max_frontier = stats.max_frontier.max(frontier.len());
            generation += 1;
        }

        stats.nodes = arena.total_nodes();
        let best = arena.get(global_best);
        info!(
            function = %self.function,
            best_ms = best.score.unwrap_or(UNUSABLE),
            schedule_len = best.history.len(),
            evaluated = stats.evaluated,
            "beam search finished"
        );
        Ok(SearchResult {
            state: Arc::clone(&best.state),
            history: best.history.clone(),
            score: best.score.unwrap_or(UNUSABLE),
            baseline_score: root_score,
            stats,
        })
    }
}

/// Pruning comparator: score ascending, ties broken by shorter history,
/// then by insertion order via the caller's stable sort. Deployments that
/// need parity with a different comparator change this one function.
fn frontier_order(a: &Node, b: &Node) -> Ordering {
    let score_a = a.score.unwrap_or(UNUSABLE);
    let score_b = b.score.unwrap_or(UNUSABLE);
    score_a
        .total_cmp(&score_b)
        .then(a.history.len().cmp(&b.history.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use looptune_eval::CostModelEvaluator;
    use looptune_ir::three_loop_matmul;
    use looptune_transforms::{default_operators, TargetInfo};

    fn engine(config: SearchConfig) -> (BeamSearch, IrState) {
        let ctx = Arc::new(CompileContext::new());
        let root = ctx
            .root_state(three_loop_matmul("mm", 64, 64, 64).unwrap())
            .unwrap();
        let operators = default_operators(Arc::clone(&ctx), TargetInfo::default());
        let search = BeamSearch::new(
            config,
            ctx,
            "mm",
            operators,
            Arc::new(CostModelEvaluator::default()),
        )
        .unwrap();
        (search, root)
    }

    #[test]
    fn rejects_invalid_config() {
        let ctx = Arc::new(CompileContext::new());
        let config = SearchConfig {
            beam_size: 0,
            ..SearchConfig::default()
        };
        assert!(BeamSearch::new(
            config,
            ctx,
            "mm",
            Vec::new(),
            Arc::new(CostModelEvaluator::default()),
        )
        .is_err());
    }

    #[test]
    fn rejects_mismatched_function() {
        let (mut search, _) = engine(SearchConfig::default());
        let other_ctx = CompileContext::new();
        let other = other_ctx
            .root_state(three_loop_matmul("other", 8, 8, 8).unwrap())
            .unwrap();
        assert!(search.search(&other).is_err());
    }

    #[test]
    fn finds_an_improving_schedule() {
        let (mut search, root) = engine(SearchConfig::default());
        let result = search.search(&root).unwrap();
        assert!(result.improved());
        assert!(result.score < result.baseline_score);
        assert!(result.history.len() <= search.config().max_depth);
    }

    #[test]
    fn comparator_prefers_lower_score_then_shorter_history() {
        let ctx = CompileContext::new();
        let state = ctx
            .root_state(three_loop_matmul("mm", 8, 8, 8).unwrap())
            .unwrap();
        let mut fast = Node::root(state.clone());
        fast.score = Some(1.0);
        let mut slow = Node::root(state.clone());
        slow.score = Some(2.0);
        assert_eq!(frontier_order(&fast, &slow), Ordering::Less);

        let mut shallow = Node::root(state.clone());
        shallow.score = Some(1.0);
        let mut deep = Node::root(state);
        deep.score = Some(1.0);
        deep.history.push(TransformRecord::new(
            looptune_transforms::ParamSet::Parallelization { dims: vec![0] },
        ));
        assert_eq!(frontier_order(&shallow, &deep), Ordering::Less);
    }
}
