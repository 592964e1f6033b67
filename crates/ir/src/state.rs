//! Immutable IR snapshots.

use crate::nest::LoopNest;

/// One point-in-time snapshot of the target function after zero or more
/// transformations.
///
/// States are never mutated: every transformation derives a fresh state
/// through [`crate::context::CompileContext::derive_state`]. The module
/// text is the printable IR handed to the toolchain; the nest is the
/// structural metadata operators query for legality.
#[derive(Debug, Clone)]
pub struct IrState {
    function: String,
    module_text: String,
    nest: LoopNest,
}

impl IrState {
    pub(crate) fn new(function: String, module_text: String, nest: LoopNest) -> Self {
        Self {
            function,
            module_text,
            nest,
        }
    }

    /// Name of the function the schedule applies to.
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Printable IR module for compilation.
    pub fn module_text(&self) -> &str {
        &self.module_text
    }

    pub fn nest(&self) -> &LoopNest {
        &self.nest
    }
}
