//! Compilation of configuration declarations into a state tree.
use ahash::{HashMap, HashMapExt};
use statechart_frontend::{
    GuardExpr, MachineDef, StateDef, StateType, TransitionDef, TransitionsDef,
};
use statechart_utils::{ChartResult, Error};

use crate::{
    Guard, NodeIdx, NodeKind, StateNode, StateTree, Transition,
    TransitionTarget,
};

/// Compile a machine configuration into an immutable state tree.
///
/// The first pass walks declarations in order, allocating arena nodes,
/// assigning absolute dotted ids, inferring kinds, and validating the
/// structure. The second pass compiles transitions and resolves their
/// targets. Guard and reducer names are *not* checked here: they may belong
/// to branches that are never visited and only fail when first evaluated.
pub fn compile(def: &MachineDef) -> ChartResult<StateTree> {
    let mut builder = Builder::default();
    builder.build_root(def)?;
    builder.attach_transitions(def)?;
    log::debug!("compiled {} states", builder.nodes.len() - 1);
    Ok(StateTree {
        nodes: builder.nodes,
        index: builder.index,
    })
}

#[derive(Default)]
struct Builder<'a> {
    nodes: Vec<StateNode>,
    index: HashMap<String, NodeIdx>,
    /// Declarations paired with their arena slots, for the second pass.
    decls: Vec<(NodeIdx, &'a StateDef)>,
}

impl<'a> Builder<'a> {
    /// First pass: build the synthetic root and every declared state.
    fn build_root(&mut self, def: &'a MachineDef) -> ChartResult<()> {
        if def.states.is_empty() {
            return Err(Error::malformed("machine declares no states"));
        }
        self.nodes.push(empty_node(
            String::new(),
            String::new(),
            None,
            0,
            // patched below once the children exist
            NodeKind::Parallel,
        ));
        let root = NodeIdx::new(0);
        let mut children = Vec::with_capacity(def.states.len());
        for (key, sub) in &def.states {
            children.push(self.build_state(key, sub, root, "")?);
        }
        // The root follows the same inference as any state with children:
        // an `initial` makes it compound, its absence makes the top-level
        // states concurrently active regions.
        let kind = match &def.initial {
            Some(initial) => NodeKind::Compound {
                initial: self.child_by_key(&children, initial)?,
            },
            None => NodeKind::Parallel,
        };
        self.nodes[0].children = children;
        self.nodes[0].kind = kind;
        Ok(())
    }

    fn build_state(
        &mut self,
        key: &str,
        def: &'a StateDef,
        parent: NodeIdx,
        parent_id: &str,
    ) -> ChartResult<NodeIdx> {
        if key.is_empty() || key.contains('.') {
            return Err(Error::malformed(format!(
                "state key `{key}' must be non-empty and must not contain `.'"
            )));
        }
        let id = if parent_id.is_empty() {
            key.to_string()
        } else {
            format!("{parent_id}.{key}")
        };
        let idx = NodeIdx::new(self.nodes.len());
        if self.index.insert(id.clone(), idx).is_some() {
            return Err(Error::already_bound(&id, "state"));
        }
        let depth = self.nodes[parent.index()].depth + 1;
        let mut node =
            empty_node(id.clone(), key.to_string(), Some(parent), depth, NodeKind::Parallel);
        node.entry = def.on_entry.iter().map(str::to_string).collect();
        node.exit = def.on_exit.iter().map(str::to_string).collect();
        node.activities = def.activities.iter().map(str::to_string).collect();
        self.nodes.push(node);
        self.decls.push((idx, def));

        let is_final = def.kind == Some(StateType::Final);
        let declared_parallel = def.kind == Some(StateType::Parallel);
        let kind = match &def.states {
            Some(states) if states.is_empty() => {
                return Err(Error::malformed(format!(
                    "state `{id}' declares an empty `states' map"
                )));
            }
            Some(states) => {
                if is_final {
                    return Err(Error::malformed(format!(
                        "final state `{id}' cannot declare children"
                    )));
                }
                let mut children = Vec::with_capacity(states.len());
                for (child_key, child) in states {
                    children.push(self.build_state(child_key, child, idx, &id)?);
                }
                let kind = if declared_parallel {
                    NodeKind::Parallel
                } else {
                    match &def.initial {
                        Some(initial) => NodeKind::Compound {
                            initial: self.child_by_key(&children, initial)?,
                        },
                        None => NodeKind::Parallel,
                    }
                };
                self.nodes[idx.index()].children = children;
                kind
            }
            None => {
                if declared_parallel {
                    return Err(Error::malformed(format!(
                        "parallel state `{id}' declares no children"
                    )));
                }
                NodeKind::Atomic { is_final }
            }
        };
        self.nodes[idx.index()].kind = kind;
        Ok(idx)
    }

    fn child_by_key(
        &self,
        children: &[NodeIdx],
        key: &str,
    ) -> ChartResult<NodeIdx> {
        children
            .iter()
            .copied()
            .find(|&c| self.nodes[c.index()].key == key)
            .ok_or_else(|| Error::undefined(key, "initial state"))
    }

    /// Second pass: compile transition declarations now that every target
    /// id is known.
    fn attach_transitions(&mut self, def: &'a MachineDef) -> ChartResult<()> {
        let root_on = self.compile_event_map(NodeIdx::new(0), def.on.iter())?;
        self.nodes[0].transitions = root_on;
        let decls = std::mem::take(&mut self.decls);
        for (idx, sub) in decls {
            let on = self.compile_event_map(idx, sub.on.iter())?;
            let always = match &sub.always {
                Some(decl) => self.compile_list(idx, decl)?,
                None => Vec::new(),
            };
            let node = &mut self.nodes[idx.index()];
            node.transitions = on;
            node.always = always;
        }
        Ok(())
    }

    fn compile_event_map<'m>(
        &self,
        source: NodeIdx,
        on: impl Iterator<Item = (&'m String, &'m TransitionsDef)>,
    ) -> ChartResult<HashMap<String, Vec<Transition>>> {
        let mut out = HashMap::new();
        for (event, decl) in on {
            out.insert(event.clone(), self.compile_list(source, decl)?);
        }
        Ok(out)
    }

    fn compile_list(
        &self,
        source: NodeIdx,
        decl: &TransitionsDef,
    ) -> ChartResult<Vec<Transition>> {
        decl.iter()
            .map(|t| self.compile_transition(source, t))
            .collect()
    }

    fn compile_transition(
        &self,
        source: NodeIdx,
        def: &TransitionDef,
    ) -> ChartResult<Transition> {
        let (target, guard, assign) = match def {
            TransitionDef::Target(t) => (Some(t.as_str()), None, None),
            TransitionDef::Full {
                target,
                guard,
                assign,
            } => (target.as_deref(), guard.as_ref(), assign.clone()),
        };
        let target = match target {
            None => TransitionTarget::Internal,
            Some(t) => self.resolve_target(source, t),
        };
        let guard = guard.map(compile_guard).transpose()?;
        Ok(Transition {
            target,
            guard,
            assign,
        })
    }

    /// Resolve a transition target. A dotted target must match an absolute
    /// id exactly; a bare key prefers a sibling of the source over a
    /// top-level state of the same name. Unresolved targets are kept as
    /// written and fail when the transition is first taken.
    fn resolve_target(
        &self,
        source: NodeIdx,
        target: &str,
    ) -> TransitionTarget {
        if target.contains('.') {
            if let Some(&idx) = self.index.get(target) {
                return TransitionTarget::Node(idx);
            }
        } else {
            if let Some(parent) = self.nodes[source.index()].parent {
                let parent_id = &self.nodes[parent.index()].id;
                let sibling = if parent_id.is_empty() {
                    target.to_string()
                } else {
                    format!("{parent_id}.{target}")
                };
                if let Some(&idx) = self.index.get(&sibling) {
                    return TransitionTarget::Node(idx);
                }
            }
            // Top-level ids are bare keys, so this also covers exact
            // absolute matches for undotted targets.
            if let Some(&idx) = self.index.get(target) {
                return TransitionTarget::Node(idx);
            }
        }
        log::warn!("transition target `{target}' does not resolve to any state");
        TransitionTarget::Unresolved(target.to_string())
    }
}

fn empty_node(
    id: String,
    key: String,
    parent: Option<NodeIdx>,
    depth: u32,
    kind: NodeKind,
) -> StateNode {
    StateNode {
        id,
        key,
        parent,
        depth,
        kind,
        children: Vec::new(),
        transitions: HashMap::new(),
        always: Vec::new(),
        entry: Vec::new(),
        exit: Vec::new(),
        activities: Vec::new(),
    }
}

fn compile_guard(expr: &GuardExpr) -> ChartResult<Guard> {
    match expr {
        GuardExpr::Ref(name) => Ok(Guard::Ref(name.clone())),
        GuardExpr::And { and } => fold_guards(and, Guard::and, "and"),
        GuardExpr::Or { or } => fold_guards(or, Guard::or, "or"),
        GuardExpr::Not { not } => Ok(compile_guard(not)?.not()),
    }
}

fn fold_guards(
    exprs: &[GuardExpr],
    combine: fn(Guard, Guard) -> Guard,
    op: &str,
) -> ChartResult<Guard> {
    let mut iter = exprs.iter();
    let Some(first) = iter.next() else {
        return Err(Error::malformed(format!(
            "empty `{op}' guard expression"
        )));
    };
    iter.try_fold(compile_guard(first)?, |acc, e| {
        Ok(combine(acc, compile_guard(e)?))
    })
}
