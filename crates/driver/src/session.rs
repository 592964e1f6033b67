//! Tuning session orchestration.

use crate::report::{kernel_signature, TuningReport};
use anyhow::Result;
use looptune_eval::Evaluator;
use looptune_ir::{CompileContext, KernelSpec};
use looptune_search::{BeamSearch, SearchConfig, SearchMethod};
use looptune_transforms::{default_operators, TargetInfo};
use std::sync::Arc;
use tracing::info;

/// Owns the compile context for one tuning run and wires the operator set,
/// evaluator, and search strategy together. The context is constructed
/// with the session and torn down with it.
pub struct TuningSession {
    ctx: Arc<CompileContext>,
    config: SearchConfig,
    target: TargetInfo,
}

impl TuningSession {
    pub fn new(config: SearchConfig, target: TargetInfo) -> Result<Self> {
        if let Err(reason) = config.validate() {
            anyhow::bail!("invalid search config: {}", reason);
        }
        Ok(Self {
            ctx: Arc::new(CompileContext::new()),
            config,
            target,
        })
    }

    pub fn context(&self) -> &Arc<CompileContext> {
        &self.ctx
    }

    /// Tune one kernel: build the root state (failure here is fatal, no
    /// result can be produced), run the beam search, and wrap the outcome
    /// in a report.
    pub fn tune(&self, spec: KernelSpec, evaluator: Arc<dyn Evaluator>) -> Result<TuningReport> {
        info!(
            function = %spec.function,
            beam_size = self.config.beam_size,
            max_depth = self.config.max_depth,
            eval_budget = self.config.eval_budget,
            timeout_ms = self.config.per_candidate_timeout.as_millis() as u64,
            "starting tuning session"
        );

        let root = self.ctx.root_state(spec)?;
        let signature = kernel_signature(&root);

        let operators = default_operators(Arc::clone(&self.ctx), self.target.clone());
        let mut search = BeamSearch::new(
            self.config.clone(),
            Arc::clone(&self.ctx),
            root.function(),
            operators,
            evaluator,
        )?;
        let result = search.search(&root)?;

        let report = TuningReport::from_result(&result);
        info!(
            signature = %signature,
            best_ms = report.best_ms,
            speedup = report.speedup,
            schedule_len = report.schedule.len(),
            states = self.ctx.derived_states(),
            "tuning session finished"
        );
        Ok(report)
    }
}
