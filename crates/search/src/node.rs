//! Search-tree nodes and their generation-scoped storage.

use looptune_eval::Cost;
use looptune_ir::IrState;
use looptune_transforms::TransformRecord;
use std::sync::Arc;

/// Identity of a node: which generation's arena holds it and where.
///
/// Ids are back-references, never owning pointers; a parent id stays valid
/// after its generation's frontier has been pruned because the arena
/// retains every generation for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub generation: u32,
    pub index: u32,
}

/// One point in the transformation search space: an immutable IR snapshot,
/// the history that produced it, and (once assigned) its score.
///
/// Depth equals history length; the root has an empty history. The score
/// is written exactly once, before the generation barrier, so nodes can be
/// shared freely across evaluation threads afterwards.
#[derive(Debug, Clone)]
pub struct Node {
    pub state: Arc<IrState>,
    pub history: Vec<TransformRecord>,
    pub score: Option<Cost>,
    pub parent: Option<NodeId>,
}

impl Node {
    pub fn root(state: IrState) -> Self {
        Self {
            state: Arc::new(state),
            history: Vec::new(),
            score: None,
            parent: None,
        }
    }

    pub fn child(parent: NodeId, parent_node: &Node, state: IrState, record: TransformRecord) -> Self {
        let mut history = parent_node.history.clone();
        history.push(record);
        Self {
            state: Arc::new(state),
            history,
            score: None,
            parent: Some(parent),
        }
    }

    pub fn depth(&self) -> usize {
        self.history.len()
    }

    /// Scored and usable: failed candidates carry the sentinel and are
    /// excluded here.
    pub fn is_viable(&self) -> bool {
        self.score.is_some_and(f64::is_finite)
    }
}

/// Strong ownership of all nodes, one arena slice per generation.
#[derive(Debug, Default)]
pub struct NodeArena {
    generations: Vec<Vec<Node>>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node to `generation`, creating the generation on first use.
    /// Generations are only ever appended in order.
    pub fn push(&mut self, generation: u32, node: Node) -> NodeId {
        let generation_usize = generation as usize;
        if self.generations.len() == generation_usize {
            self.generations.push(Vec::new());
        }
        let slot = &mut self.generations[generation_usize];
        let id = NodeId {
            generation,
            index: slot.len() as u32,
        };
        slot.push(node);
        id
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.generations[id.generation as usize][id.index as usize]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.generations[id.generation as usize][id.index as usize]
    }

    pub fn generation_len(&self, generation: u32) -> usize {
        self.generations
            .get(generation as usize)
            .map_or(0, Vec::len)
    }

    pub fn total_nodes(&self) -> usize {
        self.generations.iter().map(Vec::len).sum()
    }

    /// Path of ids from the root down to `id`, via parent back-references.
    pub fn path_from_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut cursor = id;
        while let Some(parent) = self.get(cursor).parent {
            path.push(parent);
            cursor = parent;
        }
        path.reverse();
        path
    }
}
