//! Intermediate representation for compiled statecharts.
//!
//! A configuration value is compiled once into an immutable [`StateTree`]:
//! a flat arena of [`StateNode`]s addressed by [`NodeIdx`], with an id index
//! for the absolute dotted names the outside world uses. The tree owns all
//! structure — kinds, child order, transitions, guard expressions, action
//! names — and answers the structural queries the interpreter needs
//! (ancestor walks, least common ancestors, transition lookup). It holds no
//! runtime state.
mod from_ast;
mod guard;
mod idx;
mod tree;

pub use from_ast::compile;
pub use guard::Guard;
pub use idx::NodeIdx;
pub use tree::{NodeKind, StateNode, StateTree, Transition, TransitionTarget};
