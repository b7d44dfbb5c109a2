//! The compiled, immutable state tree and its structural queries.
use ahash::HashMap;

use crate::{Guard, NodeIdx};

/// The kind of a state node. Kind only decides which structural fields are
/// meaningful; transitions and actions attach uniformly to every kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A leaf state. Entering a final atomic state halts the machine.
    Atomic { is_final: bool },
    /// A state with named children, exactly one of which is active at a
    /// time, starting with `initial`.
    Compound { initial: NodeIdx },
    /// A state whose children are concurrently active regions.
    Parallel,
}

/// Where a transition goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionTarget {
    /// No target: the transition only applies its reducer.
    Internal,
    /// A resolved target node.
    Node(NodeIdx),
    /// A target that did not resolve at compile time. Kept as written and
    /// surfaced as an error the first time the transition is taken.
    Unresolved(String),
}

/// A compiled transition.
#[derive(Debug, Clone)]
pub struct Transition {
    pub target: TransitionTarget,
    pub guard: Option<Guard>,
    /// Name of the reducer applied when the transition is taken.
    pub assign: Option<String>,
}

/// A single state in the compiled tree.
#[derive(Debug, Clone)]
pub struct StateNode {
    /// Absolute dotted id. Empty for the synthetic root.
    pub id: String,
    /// The local key of this node under its parent.
    pub key: String,
    pub parent: Option<NodeIdx>,
    /// Distance from the root. The root has depth 0.
    pub depth: u32,
    pub kind: NodeKind,
    /// Children in declaration order. For parallel nodes these are the
    /// regions.
    pub children: Vec<NodeIdx>,
    /// Event type -> transitions in declaration order.
    pub transitions: HashMap<String, Vec<Transition>>,
    /// Eventless transitions, evaluated to a fixpoint after every step.
    pub always: Vec<Transition>,
    /// Reducer names applied on entry, in declaration order.
    pub entry: Vec<String>,
    /// Reducer names applied on exit, in declaration order.
    pub exit: Vec<String>,
    /// Activity types running while this node is active.
    pub activities: Vec<String>,
}

impl StateNode {
    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, NodeKind::Atomic { .. })
    }

    pub fn is_final(&self) -> bool {
        matches!(self.kind, NodeKind::Atomic { is_final: true })
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self.kind, NodeKind::Parallel)
    }

    /// The transitions declared for the given event type, in declaration
    /// order. Empty when the node does not handle the event.
    pub fn transitions_for(&self, event_type: &str) -> &[Transition] {
        self.transitions
            .get(event_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// The compiled, immutable state tree: an arena of nodes in document order
/// (root first) plus an index from absolute ids to arena slots.
#[derive(Debug, Clone)]
pub struct StateTree {
    pub(crate) nodes: Vec<StateNode>,
    pub(crate) index: HashMap<String, NodeIdx>,
}

impl std::ops::Index<NodeIdx> for StateTree {
    type Output = StateNode;

    fn index(&self, idx: NodeIdx) -> &StateNode {
        &self.nodes[idx.index()]
    }
}

impl StateTree {
    /// The synthetic root. Always present, never externally visible.
    pub fn root(&self) -> NodeIdx {
        NodeIdx::new(0)
    }

    /// Number of nodes, including the synthetic root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Resolves an absolute dotted id.
    pub fn lookup(&self, id: &str) -> Option<NodeIdx> {
        self.index.get(id).copied()
    }

    /// All nodes in document order, root included.
    pub fn iter(&self) -> impl Iterator<Item = (NodeIdx, &StateNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeIdx::new(i), node))
    }

    /// Walks from a node up to the root, starting with the node itself.
    pub fn ancestors(&self, idx: NodeIdx) -> impl Iterator<Item = NodeIdx> + '_ {
        std::iter::successors(Some(idx), move |&n| self[n].parent)
    }

    /// Walks the ancestor chain excluding the node itself.
    pub fn strict_ancestors(
        &self,
        idx: NodeIdx,
    ) -> impl Iterator<Item = NodeIdx> + '_ {
        self.ancestors(idx).skip(1)
    }

    /// True iff `node` sits strictly below `of` in the tree.
    pub fn is_strict_descendant(&self, node: NodeIdx, of: NodeIdx) -> bool {
        self.strict_ancestors(node).any(|a| a == of)
    }

    /// The least common ancestor of two nodes. Falls back to the root,
    /// which is an ancestor of everything.
    pub fn lca(&self, a: NodeIdx, b: NodeIdx) -> NodeIdx {
        let (mut a, mut b) = (a, b);
        while self[a].depth > self[b].depth {
            a = self[a].parent.unwrap();
        }
        while self[b].depth > self[a].depth {
            b = self[b].parent.unwrap();
        }
        while a != b {
            a = self[a].parent.unwrap();
            b = self[b].parent.unwrap();
        }
        a
    }
}
