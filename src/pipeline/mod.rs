//! Host-side dataflow primitives consumed by script nodes.
//!
//! The host graph owns scheduling and wiring; this module only models what a
//! single node sees of it: its registry of ports, the messages flowing
//! through them, and the lifecycle calls the graph makes.
//!
//! # Architecture
//!
//! ```text
//! host graph ──setup/tick/process──► [ScriptNode] ──► Session ──► Interpreter
//!      ▲                                  │
//!      └──────── PortRegistry ◄───────────┘ (read/write/trigger from the script)
//! ```
//!
//! Captured script failures are forwarded through a [`DiagnosticSink`].

pub mod bridge;
pub mod constructor;
pub mod id;
pub mod message;
pub mod node;
pub mod nodes;
pub mod port;

pub use bridge::{drain, ChannelSink, DiagnosticSink, SharedSink, TracingSink};
pub use constructor::{NodeConstructor, SCRIPT_TAG};
pub use id::{NodeId, PortId};
pub use message::{Marker, Message, Token, Value, ValueKind, DEFAULT_FRAME};
pub use node::DataflowNode;
pub use nodes::{LifecycleState, ScriptNode};
pub use port::{Port, PortKind, PortRegistry, SharedPorts};
