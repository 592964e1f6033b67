//! Candidate evaluation for LoopTune.

pub mod evaluator;
pub mod model;
pub mod runner;

pub use evaluator::{median_ms, Cost, Evaluator, ExecutionFailure, UNUSABLE};
pub use model::CostModelEvaluator;
pub use runner::{CommandKernel, CommandRunner, ExecutionEvaluator, KernelRunner, TimeBudget};
