//! Read-only projections: the hierarchical state value and activities.
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use statechart_ir::{NodeIdx, NodeKind};

use crate::Machine;

/// Identifies one activity instance for an external side-effect manager.
///
/// `instance_id` is the owning state's entry count at the moment the state
/// was entered. A later re-entry produces a fresh instance id, so a manager
/// holding stale metadata can tell that its instance is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityMetadata {
    #[serde(rename = "type")]
    pub activity_type: String,
    pub state_id: String,
    pub instance_id: u64,
}

impl Machine {
    /// Derives the hierarchical state value from the active configuration:
    /// strings at atomic leaves, single-key objects through compound
    /// nodes, region maps under parallel nodes. The synthetic root is
    /// invisible. `null` until the machine has a configuration.
    pub fn state_value(&self) -> Value {
        if self.configuration.is_empty() {
            return Value::Null;
        }
        self.inner_value(self.tree.root())
    }

    /// The value describing what is active inside `idx`. Atomic nodes are
    /// projected by their parent as their bare key, so they never reach
    /// this directly.
    fn inner_value(&self, idx: NodeIdx) -> Value {
        match self.tree[idx].kind {
            NodeKind::Atomic { .. } => {
                unreachable!("atomic nodes are projected by their parent")
            }
            NodeKind::Compound { .. } => {
                let child = self.active_child(idx);
                let node = &self.tree[child];
                if node.is_atomic() {
                    Value::String(node.key.clone())
                } else {
                    let mut map = Map::new();
                    map.insert(node.key.clone(), self.inner_value(child));
                    Value::Object(map)
                }
            }
            NodeKind::Parallel => {
                let mut map = Map::new();
                for &region in &self.tree[idx].children {
                    let node = &self.tree[region];
                    let value = if node.is_atomic() {
                        Value::String(node.key.clone())
                    } else {
                        self.inner_value(region)
                    };
                    map.insert(node.key.clone(), value);
                }
                Value::Object(map)
            }
        }
    }

    fn active_child(&self, idx: NodeIdx) -> NodeIdx {
        self.tree[idx]
            .children
            .iter()
            .copied()
            .find(|child| self.configuration.contains(child))
            .unwrap()
    }

    /// Activity instances for every active state that declares activities,
    /// in document order.
    pub fn active_activities(&self) -> Vec<ActivityMetadata> {
        self.configuration
            .iter()
            .copied()
            .sorted_unstable()
            .flat_map(|idx| {
                let node = &self.tree[idx];
                let instance_id =
                    self.entry_counters.get(&idx).copied().unwrap_or(0);
                node.activities.iter().map(move |activity_type| {
                    ActivityMetadata {
                        activity_type: activity_type.clone(),
                        state_id: node.id.clone(),
                        instance_id,
                    }
                })
            })
            .collect()
    }

    /// True iff the metadata still names a live activity instance: its
    /// state is active, declares the activity, and has not been re-entered
    /// since the metadata was produced.
    pub fn is_activity_relevant(&self, metadata: &ActivityMetadata) -> bool {
        let Some(idx) = self.tree.lookup(&metadata.state_id) else {
            return false;
        };
        self.configuration.contains(&idx)
            && self.entry_counters.get(&idx).copied()
                == Some(metadata.instance_id)
            && self.tree[idx]
                .activities
                .iter()
                .any(|activity| *activity == metadata.activity_type)
    }
}
