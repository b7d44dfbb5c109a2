//! Events delivered to a machine.
use serde_json::Value;

/// Reserved event type used for the initial activation when a machine
/// starts. User events must not use it.
pub const INIT_EVENT: &str = "relay.init";

/// Reserved event type guards see while always-transitions are evaluated.
/// User events must not use it.
pub const ALWAYS_EVENT: &str = "relay.always";

/// An event handed to [`Machine::send`](crate::Machine::send).
///
/// The interpreter routes on the type alone; the payload travels untouched
/// into every guard and reducer the event reaches.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    event_type: String,
    payload: Value,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// True for the two reserved synthetic event types.
    pub fn is_internal(&self) -> bool {
        self.event_type == INIT_EVENT || self.event_type == ALWAYS_EVENT
    }

    pub(crate) fn init() -> Self {
        Event::new(INIT_EVENT)
    }

    pub(crate) fn always() -> Self {
        Event::new(ALWAYS_EVENT)
    }
}
