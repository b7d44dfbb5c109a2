//! Guard expressions attached to transitions.

/// A guard expression built from named atomic guards combined with boolean
/// connectives. Evaluation of the named leaves happens in the interpreter
/// against its registry; the tree only stores the shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// Represents `g1 || g2`.
    Or(Box<Guard>, Box<Guard>),
    /// Represents `g1 && g2`.
    And(Box<Guard>, Box<Guard>),
    /// Represents `!g`.
    Not(Box<Guard>),
    /// A reference to a named guard.
    Ref(String),
}

impl Guard {
    /// Returns a new guard equivalent to `self && other`.
    pub fn and(self, other: Guard) -> Guard {
        Guard::And(Box::new(self), Box::new(other))
    }

    /// Returns a new guard equivalent to `self || other`.
    pub fn or(self, other: Guard) -> Guard {
        Guard::Or(Box::new(self), Box::new(other))
    }

    /// Returns a new guard equivalent to `!self`.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Guard {
        Guard::Not(Box::new(self))
    }
}

impl std::fmt::Display for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Guard::Or(l, r) => write!(f, "({l} | {r})"),
            Guard::And(l, r) => write!(f, "({l} & {r})"),
            Guard::Not(g) => write!(f, "!{g}"),
            Guard::Ref(name) => write!(f, "{name}"),
        }
    }
}
