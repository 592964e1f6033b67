//! Structural loop-nest metadata queried by transformation legality checks.

use serde::{Deserialize, Serialize};

/// One loop dimension of a kernel's nest, outermost first.
///
/// The dependence and stride flags are filled in by whoever constructs the
/// root state (the pass-manager side); operators only read them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopDim {
    pub name: String,
    pub trip_count: u64,
    /// A loop-carried dependence makes the dimension unsafe to parallelize.
    pub carries_dependence: bool,
    /// Unit-stride access along this dimension permits vectorization.
    pub unit_stride: bool,
    /// Tile size applied to this dimension, if any.
    pub tile: Option<u64>,
    /// Marked for parallel execution.
    pub parallel: bool,
    /// Vector width applied to this dimension, if any.
    pub vector_width: Option<u64>,
}

impl LoopDim {
    pub fn new<N: Into<String>>(name: N, trip_count: u64) -> Self {
        Self {
            name: name.into(),
            trip_count,
            carries_dependence: false,
            unit_stride: false,
            tile: None,
            parallel: false,
            vector_width: None,
        }
    }

    pub fn with_dependence(mut self) -> Self {
        self.carries_dependence = true;
        self
    }

    pub fn with_unit_stride(mut self) -> Self {
        self.unit_stride = true;
        self
    }
}

/// The loop nest of the target function: its dimensions plus the
/// data-dependence ordering constraints interchange must preserve.
///
/// Constraints are keyed by dimension name so they survive permutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopNest {
    dims: Vec<LoopDim>,
    must_precede: Vec<(String, String)>,
}

impl LoopNest {
    pub fn new(dims: Vec<LoopDim>) -> Self {
        Self {
            dims,
            must_precede: Vec::new(),
        }
    }

    /// Require `outer` to stay outside `inner` in any reordering.
    pub fn with_ordering_constraint<A, B>(mut self, outer: A, inner: B) -> Self
    where
        A: Into<String>,
        B: Into<String>,
    {
        self.must_precede.push((outer.into(), inner.into()));
        self
    }

    pub fn dims(&self) -> &[LoopDim] {
        &self.dims
    }

    pub fn dims_mut(&mut self) -> &mut [LoopDim] {
        &mut self.dims
    }

    pub fn len(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    pub fn dim_index(&self, name: &str) -> Option<usize> {
        self.dims.iter().position(|dim| dim.name == name)
    }

    pub fn ordering_constraints(&self) -> &[(String, String)] {
        &self.must_precede
    }

    pub fn total_iterations(&self) -> u64 {
        self.dims
            .iter()
            .map(|dim| dim.trip_count)
            .fold(1u64, u64::saturating_mul)
    }

    pub fn innermost(&self) -> Option<&LoopDim> {
        self.dims.last()
    }

    /// True when `permutation` is a valid reordering of the nest that keeps
    /// every `must_precede` pair in relative order.
    pub fn permutation_is_legal(&self, permutation: &[usize]) -> bool {
        if permutation.len() != self.dims.len() {
            return false;
        }
        let mut seen = vec![false; self.dims.len()];
        for &index in permutation {
            if index >= self.dims.len() || seen[index] {
                return false;
            }
            seen[index] = true;
        }

        for (outer, inner) in &self.must_precede {
            let (Some(outer_idx), Some(inner_idx)) =
                (self.dim_index(outer), self.dim_index(inner))
            else {
                continue;
            };
            let outer_pos = permutation.iter().position(|&p| p == outer_idx);
            let inner_pos = permutation.iter().position(|&p| p == inner_idx);
            if let (Some(a), Some(b)) = (outer_pos, inner_pos) {
                if a > b {
                    return false;
                }
            }
        }
        true
    }

    /// Reorder the nest. Callers check legality first; constraints carry
    /// over unchanged because they are keyed by name.
    pub fn permuted(&self, permutation: &[usize]) -> Self {
        let dims = permutation
            .iter()
            .map(|&index| self.dims[index].clone())
            .collect();
        Self {
            dims,
            must_precede: self.must_precede.clone(),
        }
    }

    /// Structural validity of a root nest: at least one dimension, no zero
    /// trip counts, no duplicate names.
    pub fn validate(&self) -> Result<(), String> {
        if self.dims.is_empty() {
            return Err("loop nest has no dimensions".into());
        }
        for dim in &self.dims {
            if dim.trip_count == 0 {
                return Err(format!("dimension {} has zero trip count", dim.name));
            }
        }
        for (position, dim) in self.dims.iter().enumerate() {
            if self.dims[..position].iter().any(|d| d.name == dim.name) {
                return Err(format!("duplicate dimension name {}", dim.name));
            }
        }
        for (outer, inner) in &self.must_precede {
            if self.dim_index(outer).is_none() || self.dim_index(inner).is_none() {
                return Err(format!(
                    "ordering constraint {} -> {} names an unknown dimension",
                    outer, inner
                ));
            }
        }
        Ok(())
    }
}
