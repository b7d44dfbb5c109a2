//! Lifecycle, error, snapshot, and activity coverage.
use relay::{
    ActivityMetadata, Event, Machine, MachineDef, Registry, RelayError,
    Snapshot,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;

fn machine(config: Value, registry: Registry) -> Machine {
    let _ = env_logger::builder().is_test(true).try_init();
    let def: MachineDef = serde_json::from_value(config).unwrap();
    Machine::new(&def, registry).unwrap()
}

fn toggle(config: Value) -> Machine {
    machine(config, Registry::new())
}

#[test]
fn lifecycle_errors() {
    let config = json!({
        "initial": "a",
        "states": { "a": { "on": { "GO": "b" } }, "b": {} }
    });
    let mut m = toggle(config.clone());
    assert!(matches!(
        m.send(&Event::new("GO")),
        Err(RelayError::NotStarted)
    ));
    assert!(matches!(m.dump(), Err(RelayError::EmptyConfiguration)));
    assert!(matches!(m.rewind(1), Err(RelayError::TimeTravelDisabled)));
    assert!(matches!(m.forward(1), Err(RelayError::TimeTravelDisabled)));

    m.start().unwrap();
    assert!(matches!(m.start(), Err(RelayError::AlreadyStarted)));

    let snapshot = m.dump().unwrap();
    assert!(matches!(
        m.load(&snapshot),
        Err(RelayError::LoadAfterStart)
    ));
}

#[test]
fn load_validates_the_snapshot() {
    let config = json!({ "initial": "a", "states": { "a": {}, "b": {} } });
    let mut m = toggle(config.clone());
    let empty = Snapshot {
        context: Value::Null,
        configuration: vec![],
        state_counters: BTreeMap::new(),
    };
    assert!(matches!(m.load(&empty), Err(RelayError::EmptySnapshot)));

    let unknown = Snapshot {
        context: Value::Null,
        configuration: vec!["ghost".to_string()],
        state_counters: BTreeMap::new(),
    };
    assert!(matches!(
        m.load(&unknown),
        Err(RelayError::UnknownSnapshotState(id)) if id == "ghost"
    ));
}

#[test]
fn dump_load_round_trip_replays_identically() {
    let config = json!({
        "initialContext": { "count": 0 },
        "initial": "idle",
        "states": {
            "idle": { "on": { "RUN": "running" } },
            "running": {
                "initial": "warm",
                "states": {
                    "warm": { "on": { "TICK": { "assign": "increment" } } }
                },
                "on": { "STOP": "idle" }
            }
        }
    });
    let registry = || {
        Registry::new().reducer("increment", |ctx: &Value, _: &Event, _: &str| {
            json!({ "count": ctx["count"].as_i64().unwrap() + 1 })
        })
    };

    let mut original = machine(config.clone(), registry());
    original.start().unwrap();
    original.send(&Event::new("RUN")).unwrap();
    original.send(&Event::new("TICK")).unwrap();
    let snapshot = original.dump().unwrap();

    let mut restored = machine(config, registry());
    restored.load(&snapshot).unwrap();
    restored.start().unwrap();
    assert_eq!(restored.state_value(), original.state_value());
    assert_eq!(restored.context(), original.context());

    // identical event sequences keep producing identical snapshots
    for event in ["TICK", "STOP", "RUN"] {
        original.send(&Event::new(event)).unwrap();
        restored.send(&Event::new(event)).unwrap();
        assert_eq!(original.dump().unwrap(), restored.dump().unwrap());
    }
}

#[test]
fn load_defers_the_fixpoint_to_start() {
    let config = json!({
        "initial": "waiting",
        "states": {
            "waiting": {
                "always": { "target": "ready", "guard": "isReady" }
            },
            "ready": {}
        }
    });
    let registry = || {
        Registry::new()
            .guard("isReady", |ctx: &Value, _: &Event, _: &str| {
                ctx["ready"] == true
            })
    };
    let snapshot = Snapshot {
        context: json!({ "ready": true }),
        configuration: vec!["waiting".to_string()],
        state_counters: BTreeMap::from([("waiting".to_string(), 1)]),
    };

    let mut m = machine(config, registry());
    m.load(&snapshot).unwrap();
    // the always-transition has not run yet
    assert_eq!(m.state_value(), json!("waiting"));
    m.start().unwrap();
    assert_eq!(m.state_value(), json!("ready"));
}

#[test]
fn unresolved_target_fails_when_taken() {
    let mut m = toggle(json!({
        "initial": "a",
        "states": {
            "a": { "on": { "GO": "nowhere", "STAY": { "assign": "noop" } } }
        }
    }));
    m.start().unwrap();
    assert!(matches!(
        m.send(&Event::new("GO")),
        Err(RelayError::UnresolvedTarget { src, target })
            if src == "a" && target == "nowhere"
    ));
}

#[test]
fn missing_guard_and_reducer_fail_at_evaluation() {
    let config = json!({
        "initial": "a",
        "states": {
            "a": {
                "on": {
                    "GUARDED": { "target": "b", "guard": "ghostGuard" },
                    "ASSIGNED": { "assign": "ghostReducer" }
                }
            },
            "b": {}
        }
    });
    // construction succeeds: the names might never be reached
    let mut m = toggle(config);
    m.start().unwrap();
    assert!(matches!(
        m.send(&Event::new("GUARDED")),
        Err(RelayError::UnknownGuard(name)) if name == "ghostGuard"
    ));
    assert!(matches!(
        m.send(&Event::new("ASSIGNED")),
        Err(RelayError::UnknownReducer(name)) if name == "ghostReducer"
    ));
}

#[test]
fn always_ping_pong_diverges() {
    let mut m = toggle(json!({
        "initial": "a",
        "states": {
            "a": { "always": "b" },
            "b": { "always": "a" }
        }
    }));
    assert!(matches!(
        m.start(),
        Err(RelayError::FixpointDivergence(_))
    ));
}

#[test]
fn internal_always_round_stops_the_fixpoint() {
    let mut m = machine(
        json!({
            "initialContext": { "ticks": 0 },
            "initial": "a",
            "states": {
                "a": {
                    "always": { "assign": "tick" },
                    "on": { "NUDGE": { "assign": "noop" } }
                }
            }
        }),
        Registry::new()
            .reducer("tick", |ctx, _event, _id| {
                json!({ "ticks": ctx["ticks"].as_i64().unwrap() + 1 })
            })
            .reducer("noop", |_ctx, _event, _id| Value::Null),
    );
    // an unguarded internal always-transition fires once per step instead
    // of spinning the fixpoint
    m.start().unwrap();
    assert_eq!(m.context()["ticks"], 1);
    m.send(&Event::new("NUDGE")).unwrap();
    assert_eq!(m.context()["ticks"], 2);
}

#[test]
fn machine_level_handlers_are_a_fallback() {
    let mut m = toggle(json!({
        "initial": "wizard",
        "states": {
            "wizard": {
                "initial": "stepTwo",
                "states": { "stepTwo": {}, "stepOne": {} }
            },
            "home": {}
        },
        "on": { "RESET": "home" }
    }));
    m.start().unwrap();
    assert_eq!(m.state_value(), json!({ "wizard": "stepTwo" }));
    m.send(&Event::new("RESET")).unwrap();
    assert_eq!(m.state_value(), json!("home"));
}

#[test]
fn event_payloads_reach_guards_and_reducers() {
    let mut m = machine(
        json!({
            "initialContext": { "total": 0 },
            "initial": "open",
            "states": {
                "open": {
                    "on": {
                        "ADD": {
                            "assign": "add",
                            "guard": "positive"
                        }
                    }
                }
            }
        }),
        Registry::new()
            .guard("positive", |_ctx, event, _id| {
                event.payload()["amount"].as_i64().unwrap_or(0) > 0
            })
            .reducer("add", |ctx, event, _id| {
                json!({
                    "total": ctx["total"].as_i64().unwrap()
                        + event.payload()["amount"].as_i64().unwrap()
                })
            }),
    );
    m.start().unwrap();
    m.send(&Event::with_payload("ADD", json!({ "amount": 5 }))).unwrap();
    m.send(&Event::with_payload("ADD", json!({ "amount": -3 }))).unwrap();
    m.send(&Event::with_payload("ADD", json!({ "amount": 2 }))).unwrap();
    assert_eq!(m.context()["total"], 7);
}

#[test]
fn self_transition_re_enters_the_source() {
    let mut m = machine(
        json!({
            "initialContext": { "entries": 0 },
            "initial": "loop",
            "states": {
                "loop": {
                    "onEntry": "countEntry",
                    "on": { "AGAIN": "loop" }
                }
            }
        }),
        Registry::new().reducer("countEntry", |ctx, _event, _id| {
            json!({ "entries": ctx["entries"].as_i64().unwrap() + 1 })
        }),
    );
    m.start().unwrap();
    assert_eq!(m.context()["entries"], 1);
    m.send(&Event::new("AGAIN")).unwrap();
    assert_eq!(m.context()["entries"], 2);
    assert_eq!(m.dump().unwrap().state_counters["loop"], 2);
}

#[test]
fn transition_to_ancestor_re_enters_it() {
    let mut m = machine(
        json!({
            "initialContext": { "wizardEntries": 0 },
            "initial": "wizard",
            "states": {
                "wizard": {
                    "initial": "intro",
                    "onEntry": "countWizard",
                    "states": {
                        "intro": { "on": { "NEXT": "form" } },
                        "form": { "on": { "RESTART": "wizard" } }
                    }
                }
            }
        }),
        Registry::new().reducer("countWizard", |ctx, _event, _id| {
            json!({
                "wizardEntries": ctx["wizardEntries"].as_i64().unwrap() + 1
            })
        }),
    );
    m.start().unwrap();
    m.send(&Event::new("NEXT")).unwrap();
    assert_eq!(m.state_value(), json!({ "wizard": "form" }));
    // targeting the ancestor exits it and re-enters its initial chain
    m.send(&Event::new("RESTART")).unwrap();
    assert_eq!(m.state_value(), json!({ "wizard": "intro" }));
    assert_eq!(m.context()["wizardEntries"], 2);
}

#[test]
fn activities_carry_stable_instance_ids() {
    let mut m = toggle(json!({
        "initial": "lobby",
        "states": {
            "lobby": {
                "activities": ["music", "lights"],
                "on": { "ENTER_HALL": "hall" }
            },
            "hall": { "on": { "LEAVE": "lobby" } }
        }
    }));
    m.start().unwrap();
    let activities = m.active_activities();
    assert_eq!(
        activities,
        vec![
            ActivityMetadata {
                activity_type: "music".to_string(),
                state_id: "lobby".to_string(),
                instance_id: 1,
            },
            ActivityMetadata {
                activity_type: "lights".to_string(),
                state_id: "lobby".to_string(),
                instance_id: 1,
            },
        ]
    );
    let first_music = activities[0].clone();
    assert!(m.is_activity_relevant(&first_music));

    m.send(&Event::new("ENTER_HALL")).unwrap();
    assert!(m.active_activities().is_empty());
    assert!(!m.is_activity_relevant(&first_music));

    // re-entry produces a fresh instance; the old metadata stays stale
    m.send(&Event::new("LEAVE")).unwrap();
    assert!(!m.is_activity_relevant(&first_music));
    assert_eq!(m.active_activities()[0].instance_id, 2);
}

#[test]
fn snapshot_serializes_with_camel_case_fields() {
    let mut m = toggle(json!({
        "initial": "a",
        "states": { "a": {} }
    }));
    m.start().unwrap();
    let value = serde_json::to_value(m.dump().unwrap()).unwrap();
    assert_eq!(
        value,
        json!({
            "context": null,
            "configuration": ["a"],
            "stateCounters": { "a": 1 }
        })
    );
    let parsed: Snapshot = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, m.dump().unwrap());
}
