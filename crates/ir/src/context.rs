//! The shared compile context.
//!
//! Constructing IR is a structural mutation of shared compiler state, so
//! every state derivation goes through one mutex: single writer, in the
//! order callers arrive. Legality queries never touch the context: they
//! read the plain [`LoopNest`](crate::nest::LoopNest) data owned by an
//! immutable state, which is safe from any thread without a lock.

use crate::builder::{emit_module, KernelSpec};
use crate::nest::LoopNest;
use crate::state::IrState;
use anyhow::{anyhow, Result};
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct ContextInner {
    derived_states: u64,
}

/// Process-scoped compilation context, constructed once per search and
/// torn down with it.
#[derive(Debug, Default)]
pub struct CompileContext {
    inner: Mutex<ContextInner>,
}

impl CompileContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the root state from a kernel spec. Failure here is fatal to
    /// the search: no result can be produced without a root.
    pub fn root_state(&self, spec: KernelSpec) -> Result<IrState> {
        spec.nest.validate().map_err(|reason| anyhow!(reason))?;
        self.materialize(spec.function, spec.nest)
    }

    /// Derive a transformed state from `parent` with a rewritten nest.
    /// The parent is untouched and stays valid for further alternatives.
    pub fn derive_state(&self, parent: &IrState, nest: LoopNest) -> Result<IrState> {
        self.materialize(parent.function().to_string(), nest)
    }

    /// Number of states this context has constructed, root included.
    pub fn derived_states(&self) -> u64 {
        self.inner.lock().expect("compile context poisoned").derived_states
    }

    fn materialize(&self, function: String, nest: LoopNest) -> Result<IrState> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| anyhow!("compile context poisoned"))?;

        let text = emit_module(&function, &nest);
        #[cfg(feature = "mlir-verify")]
        crate::builder::verify_module_text(&text)?;

        inner.derived_states += 1;
        debug!(
            function = %function,
            total = inner.derived_states,
            "materialized IR state"
        );
        Ok(IrState::new(function, text, nest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::three_loop_matmul;

    #[test]
    fn root_state_counts_and_emits() {
        let ctx = CompileContext::new();
        let spec = three_loop_matmul("mm", 32, 32, 32).unwrap();
        let state = ctx.root_state(spec).unwrap();
        assert_eq!(state.function(), "mm");
        assert!(state.module_text().contains("func.func @mm()"));
        assert_eq!(ctx.derived_states(), 1);
    }

    #[test]
    fn derive_state_leaves_parent_untouched() {
        let ctx = CompileContext::new();
        let spec = three_loop_matmul("mm", 32, 32, 32).unwrap();
        let root = ctx.root_state(spec).unwrap();
        let baseline_text = root.module_text().to_string();

        let mut nest = root.nest().clone();
        nest.dims_mut()[0].parallel = true;
        let child = ctx.derive_state(&root, nest).unwrap();

        assert_eq!(root.module_text(), baseline_text);
        assert!(child.module_text().contains("scf.parallel"));
        assert_eq!(ctx.derived_states(), 2);
    }

    #[test]
    fn malformed_root_is_fatal() {
        let ctx = CompileContext::new();
        let spec = KernelSpec {
            function: "bad".into(),
            nest: LoopNest::new(vec![]),
        };
        assert!(ctx.root_state(spec).is_err());
    }
}
