//! Abstract search strategy contract.

use looptune_eval::Cost;
use looptune_ir::IrState;
use looptune_transforms::TransformRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Best node discovered by a search: its schedule, measured cost, and the
/// transformed state for the pass-manager side to splice back in.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub state: Arc<IrState>,
    pub history: Vec<TransformRecord>,
    pub score: Cost,
    pub baseline_score: Cost,
    pub stats: SearchStats,
}

impl SearchResult {
    /// True when a transformed candidate beat the baseline; false when the
    /// best-effort answer is the root itself.
    pub fn improved(&self) -> bool {
        !self.history.is_empty()
    }
}

/// Bookkeeping for reporting and budget accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Candidates evaluated, root included.
    pub evaluated: usize,
    /// Generations expanded (0 when the root had no legal children).
    pub generations: usize,
    /// Candidates that received the sentinel score.
    pub failures: usize,
    /// Nodes materialized across the run.
    pub nodes: usize,
    /// Widest frontier observed across the run, pruning included.
    pub max_frontier: usize,
}

/// A search strategy over the transformation space.
///
/// `search` must not mutate the caller's root state, and must terminate in
/// finite time given finite operator parameter spaces. It returns the best
/// node observed, which is the root itself when nothing beat the
/// baseline. An
/// `Err` is reserved for fatal setup problems such as a root that cannot
/// be constructed.
pub trait SearchMethod {
    fn name(&self) -> &str;

    fn search(&mut self, root: &IrState) -> anyhow::Result<SearchResult>;
}
