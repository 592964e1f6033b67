//! Kernel construction and MLIR text emission.

use crate::nest::{LoopDim, LoopNest};
use anyhow::{anyhow, Result};
use std::collections::BTreeSet;
use std::fmt::Write;

/// Description of an untransformed kernel: the function name and its loop
/// nest. A spec is what the pass-manager side hands the tuner; the shared
/// context turns it into the root [`crate::state::IrState`].
#[derive(Debug, Clone)]
pub struct KernelSpec {
    pub function: String,
    pub nest: LoopNest,
}

/// Builder for kernel specs, mirroring how modules are assembled upstream.
#[derive(Debug, Default)]
pub struct KernelBuilder {
    function: String,
    dims: Vec<LoopDim>,
    constraints: Vec<(String, String)>,
}

impl KernelBuilder {
    pub fn new<N: Into<String>>(function: N) -> Self {
        Self {
            function: function.into(),
            dims: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn loop_dim(mut self, dim: LoopDim) -> Self {
        self.dims.push(dim);
        self
    }

    pub fn ordering_constraint<A, B>(mut self, outer: A, inner: B) -> Self
    where
        A: Into<String>,
        B: Into<String>,
    {
        self.constraints.push((outer.into(), inner.into()));
        self
    }

    /// Validate and produce the kernel spec. A malformed nest here is the fatal
    /// case: no root state can be constructed from it.
    pub fn finish(self) -> Result<KernelSpec> {
        let mut nest = LoopNest::new(self.dims);
        for (outer, inner) in self.constraints {
            nest = nest.with_ordering_constraint(outer, inner);
        }
        nest.validate().map_err(|reason| anyhow!(reason))?;
        Ok(KernelSpec {
            function: self.function,
            nest,
        })
    }
}

/// Reference 3-d matmul-style nest used by the CLI and tests: i and j are
/// dependence-free, k is the unit-stride reduction dimension and must stay
/// inside j.
pub fn three_loop_matmul(function: &str, m: u64, n: u64, k: u64) -> Result<KernelSpec> {
    KernelBuilder::new(function)
        .loop_dim(LoopDim::new("i", m))
        .loop_dim(LoopDim::new("j", n))
        .loop_dim(LoopDim::new("k", k).with_unit_stride().with_dependence())
        .ordering_constraint("j", "k")
        .finish()
}

/// Print the nest as an MLIR module. Tiling splits a dimension into an
/// outer strided loop plus an intra-tile loop; parallel dimensions lower to
/// `scf.parallel` (the outer strided loop when the dimension is also
/// tiled); a vector width becomes the step of its loop.
pub fn emit_module(function: &str, nest: &LoopNest) -> String {
    let mut constants = BTreeSet::new();
    constants.insert(0u64);
    constants.insert(1u64);
    for dim in nest.dims() {
        constants.insert(dim.trip_count);
        if let Some(tile) = dim.tile {
            constants.insert(tile);
        }
        if let Some(width) = dim.vector_width {
            constants.insert(width);
        }
    }

    let mut text = String::from("module {\n");
    let _ = writeln!(
        text,
        "  func.func @{}() attributes {{looptune.schedule = \"{}\"}} {{",
        function,
        schedule_summary(nest)
    );
    for value in &constants {
        let _ = writeln!(text, "    %c{} = arith.constant {} : index", value, value);
    }

    let mut depth = 0usize;
    for dim in nest.dims() {
        let pad = "    ".repeat(depth + 1);
        if let Some(tile) = dim.tile {
            // A parallel mark on a tiled dimension lands on the outer
            // strided loop; the intra-tile loop stays serial.
            if dim.parallel {
                let _ = writeln!(
                    text,
                    "{}scf.parallel (%{}_o) = (%c0) to (%c{}) step (%c{}) {{",
                    pad, dim.name, dim.trip_count, tile
                );
            } else {
                let _ = writeln!(
                    text,
                    "{}scf.for %{}_o = %c0 to %c{} step %c{} {{",
                    pad, dim.name, dim.trip_count, tile
                );
            }
            let inner_pad = "    ".repeat(depth + 2);
            let step = dim.vector_width.unwrap_or(1);
            let _ = writeln!(
                text,
                "{}scf.for %{}_i = %c0 to %c{} step %c{} {{",
                inner_pad, dim.name, tile, step
            );
            depth += 2;
        } else if dim.parallel {
            let _ = writeln!(
                text,
                "{}scf.parallel (%{}) = (%c0) to (%c{}) step (%c1) {{",
                pad, dim.name, dim.trip_count
            );
            depth += 1;
        } else {
            let step = dim.vector_width.unwrap_or(1);
            let _ = writeln!(
                text,
                "{}scf.for %{} = %c0 to %c{} step %c{} {{",
                pad, dim.name, dim.trip_count, step
            );
            depth += 1;
        }
    }

    while depth > 0 {
        let pad = "    ".repeat(depth);
        let _ = writeln!(text, "{}}}", pad);
        depth -= 1;
    }
    text.push_str("    return\n  }\n}\n");
    text
}

fn schedule_summary(nest: &LoopNest) -> String {
    let mut parts = Vec::new();
    for dim in nest.dims() {
        if let Some(tile) = dim.tile {
            parts.push(format!("tile({}:{})", dim.name, tile));
        }
        if dim.parallel {
            parts.push(format!("parallel({})", dim.name));
        }
        if let Some(width) = dim.vector_width {
            parts.push(format!("vectorize({}:{})", dim.name, width));
        }
    }
    if parts.is_empty() {
        "baseline".to_string()
    } else {
        parts.join(",")
    }
}

/// Parse-validate emitted text against a real MLIR context.
#[cfg(feature = "mlir-verify")]
pub fn verify_module_text(text: &str) -> Result<()> {
    use anyhow::bail;
    use melior::dialect::DialectRegistry;
    use melior::ir::Module;
    use melior::utility::register_all_dialects;
    use melior::Context;

    let registry = DialectRegistry::new();
    register_all_dialects(&registry);

    let context = Context::new();
    context.append_dialect_registry(&registry);
    context.load_all_available_dialects();

    if Module::parse(&context, text).is_none() {
        bail!("failed to parse emitted MLIR module");
    }
    Ok(())
}
