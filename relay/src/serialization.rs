//! The externally visible snapshot format.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A self-describing snapshot of machine runtime state. This is the only
/// form the outside world sees the runtime in: [`Machine::dump`] produces
/// it, [`Machine::load`] consumes it, and the time-travel history stores a
/// sequence of them.
///
/// [`Machine::dump`]: crate::Machine::dump
/// [`Machine::load`]: crate::Machine::load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// The opaque context value.
    pub context: Value,
    /// Active state ids, normalised to document order.
    pub configuration: Vec<String>,
    /// Per-state entry counts. A state that was never entered is absent.
    pub state_counters: BTreeMap<String, u64>,
}
