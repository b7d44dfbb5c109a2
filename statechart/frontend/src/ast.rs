//! Abstract syntax for machine configuration values.
use linked_hash_map::LinkedHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A complete machine configuration value.
///
/// `states` and `on` use insertion-ordered maps: declaration order is
/// semantically significant for transition priority, region activation, and
/// initial-entry ordering.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineDef {
    /// The context value the machine starts with.
    #[serde(default)]
    pub initial_context: Value,
    /// Key of the initially active top-level state. When absent, the
    /// top-level states are treated as concurrently active regions.
    #[serde(default)]
    pub initial: Option<String>,
    /// Top-level state declarations, in declaration order.
    pub states: LinkedHashMap<String, StateDef>,
    /// Machine-level handlers. These attach to the synthetic root and act as
    /// a fallback for every active state.
    #[serde(default, skip_serializing_if = "LinkedHashMap::is_empty")]
    pub on: LinkedHashMap<String, TransitionsDef>,
    /// Enables step-by-step debug logging.
    #[serde(default)]
    pub debug: bool,
    /// Enables snapshot history and the rewind/forward operations.
    #[serde(default)]
    pub time_travel: bool,
}

/// A single state declaration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateDef {
    /// Explicit kind marker. `final` is only meaningful on leaf states;
    /// `parallel` forces every child to be a concurrently active region.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<StateType>,
    /// Key of the initially active child. Required for compound states;
    /// a state with children but no `initial` is treated as parallel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,
    /// Child state declarations, in declaration order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub states: Option<LinkedHashMap<String, StateDef>>,
    /// Event type -> transition declarations.
    #[serde(skip_serializing_if = "LinkedHashMap::is_empty")]
    pub on: LinkedHashMap<String, TransitionsDef>,
    /// Eventless transitions, re-evaluated until none fire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub always: Option<TransitionsDef>,
    /// Reducer names applied when the state is entered.
    #[serde(skip_serializing_if = "Names::is_empty")]
    pub on_entry: Names,
    /// Reducer names applied when the state is exited.
    #[serde(skip_serializing_if = "Names::is_empty")]
    pub on_exit: Names,
    /// Activity types that are running while the state is active.
    #[serde(skip_serializing_if = "Names::is_empty")]
    pub activities: Names,
}

/// Explicit state kind markers accepted in a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateType {
    Final,
    Parallel,
}

/// A single name or a list of names. `onEntry: "record"` and
/// `onEntry: ["record", "notify"]` both deserialize.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Names {
    One(String),
    Many(Vec<String>),
}

impl Default for Names {
    fn default() -> Self {
        Names::Many(Vec::new())
    }
}

impl Names {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        match self {
            Names::One(name) => std::slice::from_ref(name),
            Names::Many(names) => names.as_slice(),
        }
        .iter()
        .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Names::Many(names) if names.is_empty())
    }
}

/// One transition declaration or an ordered list of them. The first
/// declaration whose guard passes wins.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TransitionsDef {
    One(TransitionDef),
    Many(Vec<TransitionDef>),
}

impl TransitionsDef {
    pub fn iter(&self) -> std::slice::Iter<'_, TransitionDef> {
        match self {
            TransitionsDef::One(t) => std::slice::from_ref(t).iter(),
            TransitionsDef::Many(ts) => ts.iter(),
        }
    }
}

/// A transition declaration: a bare target key or the full object form.
/// Omitting `target` makes the transition internal (reducer-only).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TransitionDef {
    Target(String),
    Full {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guard: Option<GuardExpr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assign: Option<String>,
    },
}

/// A guard expression: a named atomic guard or an `and`/`or`/`not`
/// composition, nested arbitrarily.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum GuardExpr {
    Ref(String),
    And { and: Vec<GuardExpr> },
    Or { or: Vec<GuardExpr> },
    Not { not: Box<GuardExpr> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn machine(v: serde_json::Value) -> MachineDef {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn minimal_machine() {
        let def = machine(json!({
            "initial": "idle",
            "states": { "idle": {} }
        }));
        assert_eq!(def.initial.as_deref(), Some("idle"));
        assert!(def.states.contains_key("idle"));
        assert!(!def.time_travel);
        assert_eq!(def.initial_context, Value::Null);
    }

    #[test]
    fn camel_case_fields() {
        let def = machine(json!({
            "initialContext": { "count": 0 },
            "initial": "a",
            "timeTravel": true,
            "states": {
                "a": { "onEntry": "enterA", "onExit": ["exitA", "exitB"] }
            }
        }));
        assert!(def.time_travel);
        assert_eq!(def.initial_context, json!({ "count": 0 }));
        let a = &def.states["a"];
        assert_eq!(a.on_entry.iter().collect::<Vec<_>>(), ["enterA"]);
        assert_eq!(a.on_exit.iter().collect::<Vec<_>>(), ["exitA", "exitB"]);
    }

    #[test]
    fn transition_shapes() {
        let def = machine(json!({
            "initial": "a",
            "states": {
                "a": {
                    "on": {
                        "GO": "b",
                        "STAY": { "assign": "tick" },
                        "PICK": [
                            { "target": "b", "guard": "ready" },
                            { "target": "c" }
                        ]
                    }
                },
                "b": {},
                "c": {}
            }
        }));
        let a = &def.states["a"];
        assert!(matches!(
            a.on["GO"].iter().next().unwrap(),
            TransitionDef::Target(t) if t == "b"
        ));
        assert!(matches!(
            a.on["STAY"].iter().next().unwrap(),
            TransitionDef::Full { target: None, assign: Some(_), .. }
        ));
        assert_eq!(a.on["PICK"].iter().count(), 2);
    }

    #[test]
    fn guard_expressions() {
        let def = machine(json!({
            "initial": "a",
            "states": {
                "a": {
                    "on": {
                        "GO": {
                            "target": "b",
                            "guard": { "and": ["valid", { "not": "locked" }] }
                        }
                    }
                },
                "b": {}
            }
        }));
        let TransitionDef::Full { guard: Some(g), .. } =
            def.states["a"].on["GO"].iter().next().unwrap()
        else {
            panic!("expected full transition");
        };
        let GuardExpr::And { and } = g else {
            panic!("expected and");
        };
        assert!(matches!(&and[0], GuardExpr::Ref(name) if name == "valid"));
        assert!(matches!(&and[1], GuardExpr::Not { .. }));
    }

    #[test]
    fn states_keep_declaration_order() {
        let def: MachineDef = serde_json::from_str(
            r#"{
                "initial": "zebra",
                "states": { "zebra": {}, "apple": {}, "mango": {} }
            }"#,
        )
        .unwrap();
        let keys: Vec<_> = def.states.keys().cloned().collect();
        assert_eq!(keys, ["zebra", "apple", "mango"]);
    }
}
