//! Fitness contract and per-candidate failure taxonomy.

use looptune_ir::IrState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Measured cost in milliseconds; lower is better.
pub type Cost = f64;

/// Sentinel assigned to candidates whose evaluation failed. Such nodes are
/// reportable but can never win or be expanded.
pub const UNUSABLE: Cost = f64::INFINITY;

/// Why a candidate could not be measured. These are recoverable at the
/// search level: one candidate's failure must not abort its siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionFailure {
    /// The toolchain could not produce a runnable artifact.
    Compile { detail: String },
    /// The artifact ran but exited abnormally.
    Crash {
        exit_code: Option<i32>,
        detail: String,
    },
    /// The compile-and-run cycle exceeded the per-candidate budget.
    Timeout { limit_ms: u64 },
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionFailure::Compile { detail } => write!(f, "compilation failed: {}", detail),
            ExecutionFailure::Crash { exit_code, detail } => match exit_code {
                Some(code) => write!(f, "execution crashed (exit {}): {}", code, detail),
                None => write!(f, "execution crashed: {}", detail),
            },
            ExecutionFailure::Timeout { limit_ms } => {
                write!(f, "execution exceeded {} ms timeout", limit_ms)
            }
        }
    }
}

impl std::error::Error for ExecutionFailure {}

/// Execution-based fitness function.
///
/// Implementations must treat the state as read-only and must not write
/// through to the shared compile context; scoring has no side effects
/// beyond the returned cost.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, state: &IrState) -> Result<Cost, ExecutionFailure>;
}

/// Deterministic median of raw timings, in milliseconds. An even count
/// averages the two middle samples.
pub fn median_ms(samples: &mut [f64]) -> f64 {
    debug_assert!(!samples.is_empty());
    samples.sort_by(f64::total_cmp);
    let mid = samples.len() / 2;
    if samples.len() % 2 == 1 {
        samples[mid]
    } else {
        (samples[mid - 1] + samples[mid]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_is_deterministic() {
        let mut odd = vec![3.0, 1.0, 2.0];
        assert_eq!(median_ms(&mut odd), 2.0);
        let mut even = vec![4.0, 1.0, 3.0, 2.0];
        assert_eq!(median_ms(&mut even), 2.5);
        let mut single = vec![7.5];
        assert_eq!(median_ms(&mut single), 7.5);
    }

    #[test]
    fn failure_renders_and_serializes() {
        let failure = ExecutionFailure::Crash {
            exit_code: Some(139),
            detail: "segfault".into(),
        };
        assert!(failure.to_string().contains("exit 139"));
        let json = serde_json::to_string(&failure).unwrap();
        let parsed: ExecutionFailure = serde_json::from_str(&json).unwrap();
        assert_eq!(failure, parsed);
    }

    #[test]
    fn sentinel_compares_worse_than_any_cost() {
        assert!(UNUSABLE > 1.0e12);
    }
}
