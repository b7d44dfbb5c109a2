//! Declaration types for statechart configuration values.
//!
//! This crate defines the shape of a machine configuration as the host hands
//! it to the interpreter: a [`MachineDef`] with nested [`StateDef`]s,
//! transition declarations, and guard expressions. The types deserialize from
//! the camelCase configuration format and stay close to it; all semantic
//! validation happens when the declarations are compiled into a state tree.
//!
//! Guards and reducers appear here as *names only*. The callables those names
//! resolve to never travel with the configuration; they are registered
//! separately with the interpreter.
mod ast;

pub use ast::{
    GuardExpr, MachineDef, Names, StateDef, StateType, TransitionDef,
    TransitionsDef,
};
