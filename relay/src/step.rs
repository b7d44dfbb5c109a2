//! The step engine: transition selection, exit/entry bookkeeping, and the
//! eventless fixpoint.
//!
//! A macrostep processes one external event: every active atomic state
//! nominates at most one transition by climbing its ancestor chain, the
//! surviving transitions are applied in order, and always-transitions are
//! then re-selected and applied until none fire. All ordering is
//! deterministic: atomics are enumerated in document order, transition
//! lists in declaration order, exits leaf-first, entries root-first.
use ahash::{HashSet, HashSetExt};
use itertools::Itertools;
use log::debug;
use serde_json::Value;
use smallvec::SmallVec;
use statechart_ir::{Guard, NodeIdx, NodeKind, Transition, TransitionTarget};

use crate::{Event, Machine, RelayError, RelayResult};

/// Iteration cap for the eventless fixpoint. Exceeding it means the
/// always-transition graph cycles.
const ALWAYS_ITERATION_CAP: usize = 100;

/// Which transition list selection draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectionKind {
    Event,
    Always,
}

/// A transition chosen during selection, tagged with the node that
/// declares it.
struct Selected {
    source: NodeIdx,
    transition: Transition,
}

struct ApplyOutcome {
    /// True when every applied transition was internal. The configuration
    /// cannot have changed, so re-running selection would loop forever.
    all_internal: bool,
}

impl Machine {
    /// One macrostep minus the halt/history bookkeeping: apply the event's
    /// transitions, then run the always fixpoint.
    pub(crate) fn step(&mut self, event: &Event) -> RelayResult<()> {
        let selected = self.select(event, SelectionKind::Event)?;
        if self.debug {
            debug!(
                "`{}' selected {} transition(s)",
                event.event_type(),
                selected.len()
            );
        }
        self.apply(selected, event)?;
        self.run_always_fixpoint()?;
        Ok(())
    }

    /// Activates the root's initial chain on first start.
    pub(crate) fn enter_initial(&mut self, event: &Event) -> RelayResult<()> {
        let root = self.tree.root();
        match self.tree[root].kind {
            NodeKind::Compound { initial } => {
                self.enter_node(initial, event, true)
            }
            NodeKind::Parallel => {
                for region in self.tree[root].children.clone() {
                    self.enter_node(region, event, true)?;
                }
                Ok(())
            }
            NodeKind::Atomic { .. } => {
                unreachable!("the root always has children")
            }
        }
    }

    /// Repeatedly selects and applies always-transitions until none fire
    /// or an all-internal round makes further progress impossible.
    /// Exceeding the iteration cap is fatal: the machine state must be
    /// treated as corrupted.
    pub(crate) fn run_always_fixpoint(&mut self) -> RelayResult<()> {
        let event = Event::always();
        for round in 0..ALWAYS_ITERATION_CAP {
            let selected = self.select(&event, SelectionKind::Always)?;
            if selected.is_empty() {
                if self.debug && round > 0 {
                    debug!("always fixpoint after {round} microstep(s)");
                }
                return Ok(());
            }
            let outcome = self.apply(selected, &event)?;
            if outcome.all_internal {
                return Ok(());
            }
        }
        Err(RelayError::FixpointDivergence(ALWAYS_ITERATION_CAP))
    }

    // ---------- selection ----------

    /// Selects at most one transition per active atomic state: climb the
    /// ancestor chain, take the first declaration whose guard passes, stop
    /// climbing. Identical nominations are deduplicated and parallel
    /// ancestors are shadowed by selections made strictly below them.
    fn select(
        &self,
        event: &Event,
        kind: SelectionKind,
    ) -> RelayResult<Vec<Selected>> {
        let mut chosen: Vec<Selected> = Vec::new();
        let mut seen: HashSet<(NodeIdx, usize)> = HashSet::new();
        let atomics = self
            .configuration
            .iter()
            .copied()
            .filter(|&idx| self.tree[idx].is_atomic())
            .sorted_unstable();
        for atomic in atomics {
            'climb: for source in self.tree.ancestors(atomic) {
                let node = &self.tree[source];
                let list = match kind {
                    SelectionKind::Event => {
                        node.transitions_for(event.event_type())
                    }
                    SelectionKind::Always => node.always.as_slice(),
                };
                for (index, transition) in list.iter().enumerate() {
                    if self.guard_passes(
                        transition.guard.as_ref(),
                        event,
                        &node.id,
                    )? {
                        if seen.insert((source, index)) {
                            chosen.push(Selected {
                                source,
                                transition: transition.clone(),
                            });
                        }
                        break 'climb;
                    }
                }
            }
        }
        // Structural shadowing: a parallel ancestor loses to any selected
        // transition declared strictly below it.
        let shadowed: HashSet<NodeIdx> = chosen
            .iter()
            .flat_map(|sel| self.tree.strict_ancestors(sel.source))
            .filter(|&ancestor| self.tree[ancestor].is_parallel())
            .collect();
        chosen.retain(|sel| !shadowed.contains(&sel.source));
        Ok(chosen)
    }

    fn guard_passes(
        &self,
        guard: Option<&Guard>,
        event: &Event,
        source_id: &str,
    ) -> RelayResult<bool> {
        match guard {
            None => Ok(true),
            Some(guard) => self.eval_guard(guard, event, source_id),
        }
    }

    fn eval_guard(
        &self,
        guard: &Guard,
        event: &Event,
        source_id: &str,
    ) -> RelayResult<bool> {
        Ok(match guard {
            Guard::Ref(name) => {
                let guard_fn = self
                    .registry
                    .get_guard(name)
                    .ok_or_else(|| RelayError::UnknownGuard(name.clone()))?;
                guard_fn(&self.context, event, source_id)
            }
            Guard::And(left, right) => {
                self.eval_guard(left, event, source_id)?
                    && self.eval_guard(right, event, source_id)?
            }
            Guard::Or(left, right) => {
                self.eval_guard(left, event, source_id)?
                    || self.eval_guard(right, event, source_id)?
            }
            Guard::Not(inner) => !self.eval_guard(inner, event, source_id)?,
        })
    }

    // ---------- application ----------

    fn apply(
        &mut self,
        selected: Vec<Selected>,
        event: &Event,
    ) -> RelayResult<ApplyOutcome> {
        let mut all_internal = true;
        for sel in selected {
            // The root is implicitly active; any other source may have been
            // deactivated by an earlier transition in this round.
            let source_active = sel.source == self.tree.root()
                || self.configuration.contains(&sel.source);
            if !source_active {
                continue;
            }
            match &sel.transition.target {
                TransitionTarget::Internal => {
                    if let Some(reducer) = &sel.transition.assign {
                        self.apply_reducer(reducer, event, sel.source)?;
                    }
                }
                TransitionTarget::Unresolved(target) => {
                    return Err(RelayError::UnresolvedTarget {
                        src: self.tree[sel.source].id.clone(),
                        target: target.clone(),
                    });
                }
                TransitionTarget::Node(target) => {
                    all_internal = false;
                    self.take_transition(
                        sel.source,
                        *target,
                        sel.transition.assign.as_deref(),
                        event,
                    )?;
                }
            }
        }
        Ok(ApplyOutcome { all_internal })
    }

    /// Applies one external transition: leaf-first exits up to the least
    /// common ancestor, the assign reducer, then root-first entries down
    /// to the target.
    fn take_transition(
        &mut self,
        source: NodeIdx,
        target: NodeIdx,
        assign: Option<&str>,
        event: &Event,
    ) -> RelayResult<()> {
        if self.debug {
            debug!(
                "transition `{}' -> `{}'",
                self.tree[source].id, self.tree[target].id
            );
        }
        if source == target {
            // A self-transition leaves and re-enters its source.
            self.exit_node(source, event)?;
            if let Some(reducer) = assign {
                self.apply_reducer(reducer, event, source)?;
            }
            return self.enter_node(source, event, true);
        }
        let lca = self.tree.lca(source, target);
        if target == lca {
            // A transition to an ancestor exits and re-enters the ancestor
            // itself; it belongs to both the exit and the entry set.
            let mut node = source;
            loop {
                self.exit_node(node, event)?;
                if node == lca {
                    break;
                }
                node = self.tree[node].parent.unwrap();
            }
            if let Some(reducer) = assign {
                self.apply_reducer(reducer, event, source)?;
            }
            return self.enter_node(target, event, true);
        }
        // Crossing a parallel boundary tears the parallel node down whole,
        // so the effective boundary is the nearest non-parallel common
        // ancestor. `None` means the regions of a parallel root.
        let mut boundary = Some(lca);
        while let Some(node) = boundary {
            if !self.tree[node].is_parallel() {
                break;
            }
            boundary = self.tree[node].parent;
        }
        match boundary {
            Some(node) if node == source => {
                // Straight down into a descendant: the source stays
                // active, its current child chain does not.
                for child in self.tree[source].children.clone() {
                    if self.configuration.contains(&child) {
                        self.exit_node(child, event)?;
                    }
                }
            }
            Some(stop) => {
                let mut node = source;
                while node != stop {
                    self.exit_node(node, event)?;
                    node = self.tree[node].parent.unwrap();
                }
            }
            None => {
                let root = self.tree.root();
                for child in self.tree[root].children.clone() {
                    if self.configuration.contains(&child) {
                        self.exit_node(child, event)?;
                    }
                }
            }
        }
        if let Some(reducer) = assign {
            self.apply_reducer(reducer, event, source)?;
        }
        let stop = boundary.unwrap_or_else(|| self.tree.root());
        let mut path: SmallVec<[NodeIdx; 8]> = self
            .tree
            .ancestors(target)
            .take_while(|&node| node != stop)
            .collect();
        path.reverse();
        match boundary {
            Some(_) => self.enter_path(&path, event),
            None => {
                // Re-assemble every region of the parallel root: the
                // target's region along the path, the rest through their
                // initial chains.
                let root = self.tree.root();
                for region in self.tree[root].children.clone() {
                    if region == path[0] {
                        self.enter_path(&path, event)?;
                    } else {
                        self.enter_node(region, event, true)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Enters a chain of nodes root-first. Only the last node (the
    /// explicit target) follows its initial children; an intermediate
    /// compound node continues along the path instead of its declared
    /// initial, and an intermediate parallel node activates its off-path
    /// regions in declaration order.
    fn enter_path(
        &mut self,
        path: &[NodeIdx],
        event: &Event,
    ) -> RelayResult<()> {
        let (&head, rest) = path.split_first().unwrap();
        if rest.is_empty() {
            return self.enter_node(head, event, true);
        }
        self.enter_node(head, event, false)?;
        match self.tree[head].kind {
            NodeKind::Compound { .. } => self.enter_path(rest, event),
            NodeKind::Parallel => {
                for region in self.tree[head].children.clone() {
                    if region == rest[0] {
                        self.enter_path(rest, event)?;
                    } else {
                        self.enter_node(region, event, true)?;
                    }
                }
                Ok(())
            }
            NodeKind::Atomic { .. } => {
                unreachable!("path intermediates have children")
            }
        }
    }

    /// Exits a node: active children first (leaf-first, declaration order
    /// across siblings), then the node's own exit reducers, then removal
    /// from the configuration.
    fn exit_node(&mut self, idx: NodeIdx, event: &Event) -> RelayResult<()> {
        for child in self.tree[idx].children.clone() {
            if self.configuration.contains(&child) {
                self.exit_node(child, event)?;
            }
        }
        for i in 0..self.tree[idx].exit.len() {
            let reducer = self.tree[idx].exit[i].clone();
            self.apply_reducer(&reducer, event, idx)?;
        }
        self.configuration.remove(&idx);
        Ok(())
    }

    /// Enters a node: bump its entry counter, fold its entry reducers in
    /// declaration order, optionally follow its children (the compound
    /// initial chain, every parallel region), then add it to the
    /// configuration.
    fn enter_node(
        &mut self,
        idx: NodeIdx,
        event: &Event,
        follow: bool,
    ) -> RelayResult<()> {
        *self.entry_counters.entry(idx).or_insert(0) += 1;
        for i in 0..self.tree[idx].entry.len() {
            let reducer = self.tree[idx].entry[i].clone();
            self.apply_reducer(&reducer, event, idx)?;
        }
        if follow {
            match self.tree[idx].kind {
                NodeKind::Compound { initial } => {
                    self.enter_node(initial, event, true)?;
                }
                NodeKind::Parallel => {
                    for region in self.tree[idx].children.clone() {
                        self.enter_node(region, event, true)?;
                    }
                }
                NodeKind::Atomic { .. } => {}
            }
        }
        self.configuration.insert(idx);
        Ok(())
    }

    /// Applies a named reducer and shallow-merges its result over the
    /// context.
    fn apply_reducer(
        &mut self,
        name: &str,
        event: &Event,
        node: NodeIdx,
    ) -> RelayResult<()> {
        let reducer = self
            .registry
            .get_reducer(name)
            .ok_or_else(|| RelayError::UnknownReducer(name.to_string()))?;
        let patch = reducer(&self.context, event, &self.tree[node].id);
        merge_context(&mut self.context, patch);
        Ok(())
    }
}

/// `new = merge(old, patch)`: a `null` patch is a no-op, an object patch
/// overlays top-level keys, anything else replaces the context.
fn merge_context(context: &mut Value, patch: Value) {
    match patch {
        Value::Null => {}
        Value::Object(patch) => {
            if let Value::Object(base) = context {
                for (key, value) in patch {
                    base.insert(key, value);
                }
            } else {
                *context = Value::Object(patch);
            }
        }
        other => *context = other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overlays_top_level_keys() {
        let mut context = json!({ "a": 1, "b": { "nested": true } });
        merge_context(&mut context, json!({ "b": 2, "c": 3 }));
        assert_eq!(context, json!({ "a": 1, "b": 2, "c": 3 }));
    }

    #[test]
    fn merge_null_is_a_no_op() {
        let mut context = json!({ "a": 1 });
        merge_context(&mut context, Value::Null);
        assert_eq!(context, json!({ "a": 1 }));
    }

    #[test]
    fn merge_replaces_non_object_wholesale() {
        let mut context = json!({ "a": 1 });
        merge_context(&mut context, json!(42));
        assert_eq!(context, json!(42));
        merge_context(&mut context, json!({ "fresh": true }));
        assert_eq!(context, json!({ "fresh": true }));
    }
}
