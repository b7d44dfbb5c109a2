//! Named guard and reducer tables.
use ahash::HashMap;
use serde_json::Value;

use crate::Event;

/// A named pure predicate over `(context, event, source state id)`.
pub type GuardFn = Box<dyn Fn(&Value, &Event, &str) -> bool>;

/// A named pure function over `(context, event, state id)` returning a
/// partial context that is shallow-merged over the current one.
pub type ReducerFn = Box<dyn Fn(&Value, &Event, &str) -> Value>;

/// The side tables a configuration's guard and reducer names resolve
/// against. Configurations reference behaviour strictly by name, so the
/// structural tree stays serialisable; the registry is the only place
/// actual code lives.
///
/// Guards and reducers must be pure and synchronous: no observable side
/// effects, no hidden state, no clocks or randomness. The interpreter does
/// not enforce this but depends on it for determinism and for time travel.
#[derive(Default)]
pub struct Registry {
    guards: HashMap<String, GuardFn>,
    reducers: HashMap<String, ReducerFn>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a guard under `name`, replacing any previous binding.
    pub fn guard(
        mut self,
        name: impl Into<String>,
        guard: impl Fn(&Value, &Event, &str) -> bool + 'static,
    ) -> Self {
        self.guards.insert(name.into(), Box::new(guard));
        self
    }

    /// Registers a reducer under `name`, replacing any previous binding.
    pub fn reducer(
        mut self,
        name: impl Into<String>,
        reducer: impl Fn(&Value, &Event, &str) -> Value + 'static,
    ) -> Self {
        self.reducers.insert(name.into(), Box::new(reducer));
        self
    }

    pub(crate) fn get_guard(&self, name: &str) -> Option<&GuardFn> {
        self.guards.get(name)
    }

    pub(crate) fn get_reducer(&self, name: &str) -> Option<&ReducerFn> {
        self.reducers.get(name)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("guards", &self.guards.keys().collect::<Vec<_>>())
            .field("reducers", &self.reducers.keys().collect::<Vec<_>>())
            .finish()
    }
}
