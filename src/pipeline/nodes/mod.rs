//! Pipeline node implementations.

pub mod script_node;

pub use script_node::{LifecycleState, ScriptNode};
