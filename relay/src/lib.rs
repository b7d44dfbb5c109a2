//! A deterministic, synchronous statechart interpreter.
//!
//! Relay executes hierarchical state machines in the Harel/SCXML tradition
//! with one deliberate restriction: every piece of state-affecting logic is a
//! *pure reducer* over an opaque context value. The interpreter owns no
//! side-effect machinery — no timers, no spawned tasks, no I/O. A host feeds
//! it events through [`Machine::send`] and reads the resulting configuration,
//! context, and activity set back out; everything effectful happens outside.
//!
//! A machine is built from two pieces: a declarative configuration value
//! (deserialized into [`MachineDef`]) describing the state tree, and a
//! [`Registry`] binding the guard and reducer *names* that configuration
//! mentions to actual functions. The split keeps configurations serialisable
//! and snapshots portable across processes.
//!
//! ```
//! use relay::{Event, Machine, MachineDef, Registry};
//! use serde_json::json;
//!
//! let def: MachineDef = serde_json::from_value(json!({
//!     "initialContext": { "count": 0 },
//!     "initial": "active",
//!     "states": {
//!         "active": { "on": { "INCREMENT": { "assign": "increment" } } }
//!     }
//! }))
//! .unwrap();
//!
//! let registry = Registry::new().reducer("increment", |ctx, _event, _id| {
//!     json!({ "count": ctx["count"].as_i64().unwrap() + 1 })
//! });
//!
//! let mut machine = Machine::new(&def, registry).unwrap();
//! machine.start().unwrap();
//! machine.send(&Event::new("INCREMENT")).unwrap();
//! assert_eq!(machine.context()["count"], 1);
//! assert_eq!(machine.state_value(), json!("active"));
//! ```
mod errors;
mod event;
mod history;
mod machine;
mod registry;
mod serialization;
mod step;
mod value;

pub use errors::{RelayError, RelayResult};
pub use event::{ALWAYS_EVENT, Event, INIT_EVENT};
pub use machine::Machine;
pub use registry::Registry;
pub use serialization::Snapshot;
pub use value::ActivityMetadata;

// Re-exported so hosts can depend on `relay` alone.
pub use statechart_frontend::{MachineDef, StateDef};
