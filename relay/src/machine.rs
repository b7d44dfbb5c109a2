//! The machine runtime: lifecycle, snapshots, and read operations.
use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use itertools::Itertools;
use log::{debug, info};
use serde_json::Value;
use statechart_frontend::MachineDef;
use statechart_ir::{NodeIdx, StateTree};

use crate::history::History;
use crate::{Event, Registry, RelayError, RelayResult, Snapshot};

/// A running statechart instance.
///
/// A machine is compiled once from a [`MachineDef`] and a [`Registry`] and
/// then driven through its lifecycle: constructed, optionally loaded from a
/// snapshot, started exactly once, and finally halted when a final state is
/// reached. All execution is synchronous; [`send`](Self::send) returns only
/// once the configuration has been stabilised by the eventless fixpoint and
/// the history entry, when enabled, has been recorded.
pub struct Machine {
    pub(crate) tree: StateTree,
    pub(crate) registry: Registry,
    pub(crate) context: Value,
    /// Active node set. The synthetic root is implicitly active and never
    /// stored.
    pub(crate) configuration: HashSet<NodeIdx>,
    /// Per-node entry counts, the source of activity instance ids. A node
    /// that was never entered is absent.
    pub(crate) entry_counters: HashMap<NodeIdx, u64>,
    pub(crate) halted: bool,
    started: bool,
    loaded: bool,
    history: Option<History>,
    pub(crate) debug: bool,
}

impl Machine {
    /// Compiles the configuration and seeds the context. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(def: &MachineDef, registry: Registry) -> RelayResult<Self> {
        let tree = statechart_ir::compile(def)?;
        Ok(Self {
            tree,
            registry,
            context: def.initial_context.clone(),
            configuration: HashSet::new(),
            entry_counters: HashMap::new(),
            halted: false,
            started: false,
            loaded: false,
            history: def.time_travel.then(History::default),
            debug: def.debug,
        })
    }

    /// Installs a snapshot produced by [`dump`](Self::dump). Only legal
    /// before `start`. The eventless fixpoint deliberately does not run
    /// here: the caller can inspect the loaded machine first, and any
    /// fixpoint differences introduced by changed always-transition graphs
    /// happen under the explicit `start` that follows.
    pub fn load(&mut self, snapshot: &Snapshot) -> RelayResult<&mut Self> {
        if self.started {
            return Err(RelayError::LoadAfterStart);
        }
        self.restore(snapshot)?;
        self.loaded = true;
        info!("loaded snapshot with {} active state(s)", self.configuration.len());
        Ok(self)
    }

    /// Activates the machine. From a fresh construction this enters the
    /// root's initial chain; from a loaded snapshot it runs the eventless
    /// fixpoint on the restored configuration. Required exactly once;
    /// events are rejected until it has run.
    pub fn start(&mut self) -> RelayResult<&mut Self> {
        if self.started {
            return Err(RelayError::AlreadyStarted);
        }
        self.started = true;
        if self.loaded {
            self.run_always_fixpoint()?;
        } else {
            self.enter_initial(&Event::init())?;
            self.run_always_fixpoint()?;
        }
        self.halted = self.any_active_final();
        self.record_history();
        Ok(self)
    }

    /// Runs one macrostep: selection and application of the event's
    /// transitions followed by the always fixpoint. Events sent to a halted
    /// machine are silently ignored. A send while the history cursor is
    /// rewound discards the abandoned future first.
    pub fn send(&mut self, event: &Event) -> RelayResult<()> {
        if !self.started {
            return Err(RelayError::NotStarted);
        }
        if self.halted {
            debug!("machine halted; ignoring `{}'", event.event_type());
            return Ok(());
        }
        if let Some(history) = &mut self.history {
            if !history.at_tail() {
                history.truncate_to_cursor();
            }
        }
        let config_before = self.configuration.clone();
        let context_before = self.context.clone();

        self.step(event)?;

        self.halted = self.any_active_final();
        if self.configuration != config_before || self.context != context_before
        {
            self.record_history();
        }
        Ok(())
    }

    /// Moves the history cursor back by at most `n` snapshots and restores
    /// the machine to the snapshot there.
    pub fn rewind(&mut self, n: usize) -> RelayResult<&mut Self> {
        let snapshot = {
            let Some(history) = &mut self.history else {
                return Err(RelayError::TimeTravelDisabled);
            };
            if !self.started {
                return Err(RelayError::NotStarted);
            }
            history.rewind(n).clone()
        };
        self.restore(&snapshot)?;
        Ok(self)
    }

    /// Moves the history cursor forward by at most `n` snapshots and
    /// restores the machine to the snapshot there.
    pub fn forward(&mut self, n: usize) -> RelayResult<&mut Self> {
        let snapshot = {
            let Some(history) = &mut self.history else {
                return Err(RelayError::TimeTravelDisabled);
            };
            if !self.started {
                return Err(RelayError::NotStarted);
            }
            history.forward(n).clone()
        };
        self.restore(&snapshot)?;
        Ok(self)
    }

    /// Serialises the current runtime state.
    pub fn dump(&self) -> RelayResult<Snapshot> {
        if self.configuration.is_empty() {
            return Err(RelayError::EmptyConfiguration);
        }
        Ok(self.snapshot())
    }

    /// The current context value.
    pub fn context(&self) -> &Value {
        &self.context
    }

    /// Active state ids in document order. Empty until the machine starts.
    pub fn configuration(&self) -> Vec<String> {
        self.configuration_ids()
    }

    /// True once a final atomic state has been entered. A halted machine
    /// ignores further events.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Number of recorded snapshots, when time travel is enabled.
    pub fn history_len(&self) -> Option<usize> {
        self.history.as_ref().map(History::len)
    }

    /// Position of the history cursor, when time travel is enabled.
    pub fn history_cursor(&self) -> Option<usize> {
        self.history.as_ref().map(History::cursor)
    }

    /// Installs a snapshot's context, configuration, and counters after
    /// validating every id against the compiled tree. `halted` is
    /// recomputed from the restored configuration.
    fn restore(&mut self, snapshot: &Snapshot) -> RelayResult<()> {
        if snapshot.configuration.is_empty() {
            return Err(RelayError::EmptySnapshot);
        }
        let mut configuration =
            HashSet::with_capacity(snapshot.configuration.len());
        for id in &snapshot.configuration {
            configuration.insert(self.resolve_id(id)?);
        }
        let mut entry_counters =
            HashMap::with_capacity(snapshot.state_counters.len());
        for (id, &count) in &snapshot.state_counters {
            entry_counters.insert(self.resolve_id(id)?, count);
        }
        self.context = snapshot.context.clone();
        self.configuration = configuration;
        self.entry_counters = entry_counters;
        self.halted = self.any_active_final();
        Ok(())
    }

    fn resolve_id(&self, id: &str) -> RelayResult<NodeIdx> {
        self.tree
            .lookup(id)
            .ok_or_else(|| RelayError::UnknownSnapshotState(id.to_string()))
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            context: self.context.clone(),
            configuration: self.configuration_ids(),
            state_counters: self
                .entry_counters
                .iter()
                .map(|(&idx, &count)| (self.tree[idx].id.clone(), count))
                .collect(),
        }
    }

    fn record_history(&mut self) {
        if self.history.is_some() {
            let snapshot = self.snapshot();
            if let Some(history) = &mut self.history {
                history.record(snapshot);
            }
        }
    }

    fn configuration_ids(&self) -> Vec<String> {
        self.configuration
            .iter()
            .copied()
            .sorted_unstable()
            .map(|idx| self.tree[idx].id.clone())
            .collect()
    }

    pub(crate) fn any_active_final(&self) -> bool {
        self.configuration.iter().any(|&idx| self.tree[idx].is_final())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use statechart_ir::NodeKind;

    fn machine(config: serde_json::Value, registry: Registry) -> Machine {
        let def: MachineDef = serde_json::from_value(config).unwrap();
        Machine::new(&def, registry).unwrap()
    }

    /// Walks the configuration and checks the structural invariants that
    /// must hold after every public operation.
    fn assert_invariants(m: &Machine) {
        for &idx in &m.configuration {
            let node = &m.tree[idx];
            if let Some(parent) = node.parent {
                assert!(
                    parent == m.tree.root()
                        || m.configuration.contains(&parent),
                    "active node `{}' has an inactive parent",
                    node.id
                );
            }
            match node.kind {
                NodeKind::Compound { .. } => {
                    let active_children = node
                        .children
                        .iter()
                        .filter(|c| m.configuration.contains(*c))
                        .count();
                    assert_eq!(
                        active_children, 1,
                        "compound `{}' must have exactly one active child",
                        node.id
                    );
                }
                NodeKind::Parallel => {
                    for region in &node.children {
                        assert!(
                            m.configuration.contains(region),
                            "region `{}' of `{}' must be active",
                            m.tree[*region].id,
                            node.id
                        );
                    }
                }
                NodeKind::Atomic { .. } => {}
            }
        }
        assert_eq!(m.halted, m.any_active_final());
        for count in m.entry_counters.values() {
            assert!(*count >= 1);
        }
    }

    #[test]
    fn start_activates_initial_chain() {
        let mut m = machine(
            json!({
                "initial": "a",
                "states": {
                    "a": { "initial": "b", "states": { "b": {}, "c": {} } },
                    "d": {}
                }
            }),
            Registry::new(),
        );
        assert!(m.configuration().is_empty());
        m.start().unwrap();
        assert_eq!(m.configuration(), ["a", "a.b"]);
        assert_invariants(&m);
    }

    #[test]
    fn parallel_root_activates_every_region() {
        let mut m = machine(
            json!({
                "states": {
                    "left": { "initial": "l1", "states": { "l1": {}, "l2": {} } },
                    "right": { "initial": "r1", "states": { "r1": {}, "r2": {} } }
                }
            }),
            Registry::new(),
        );
        m.start().unwrap();
        assert_eq!(m.configuration(), ["left", "left.l1", "right", "right.r1"]);
        assert_invariants(&m);
    }

    #[test]
    fn transitions_preserve_invariants() {
        let mut m = machine(
            json!({
                "initial": "idle",
                "states": {
                    "idle": { "on": { "RUN": "working" } },
                    "working": {
                        "type": "parallel",
                        "on": { "STOP": "idle" },
                        "states": {
                            "fetch": { "initial": "wait",
                                       "states": { "wait": {}, "busy": {} } },
                            "ui": { "initial": "shown",
                                    "states": { "shown": {}, "hidden": {} } }
                        }
                    }
                }
            }),
            Registry::new(),
        );
        m.start().unwrap();
        for event in ["RUN", "STOP", "RUN"] {
            m.send(&Event::new(event)).unwrap();
            assert_invariants(&m);
        }
        assert_eq!(
            m.configuration(),
            ["working", "working.fetch", "working.fetch.wait", "working.ui",
             "working.ui.shown"]
        );
    }

    #[test]
    fn halting_on_final_state() {
        let mut m = machine(
            json!({
                "initial": "running",
                "states": {
                    "running": { "on": { "FINISH": "done" } },
                    "done": { "type": "final" }
                }
            }),
            Registry::new(),
        );
        m.start().unwrap();
        assert!(!m.is_halted());
        m.send(&Event::new("FINISH")).unwrap();
        assert!(m.is_halted());
        assert_invariants(&m);
        // further events are silently ignored
        m.send(&Event::new("FINISH")).unwrap();
        assert_eq!(m.state_value(), json!("done"));
    }
}
