//! Search configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Knobs for a tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Frontier width retained after pruning.
    pub beam_size: usize,
    /// Maximum schedule length; generations stop expanding at this depth.
    pub max_depth: usize,
    /// Maximum number of candidates evaluated across the run, root
    /// included.
    pub eval_budget: usize,
    /// Wall-clock budget for one candidate's compile-and-run cycle.
    pub per_candidate_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            beam_size: 4,
            max_depth: 4,
            eval_budget: 256,
            per_candidate_timeout: Duration::from_secs(30),
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.beam_size == 0 {
            return Err("beam size must be > 0".into());
        }
        if self.eval_budget == 0 {
            return Err("evaluation budget must be >= 1 (the root is evaluated)".into());
        }
        if self.per_candidate_timeout.is_zero() {
            return Err("per-candidate timeout must be non-zero".into());
        }
        Ok(())
    }
}
