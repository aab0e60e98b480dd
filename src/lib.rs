//! # ScriptNode: Rhai-scripted dataflow nodes
//!
//! A dataflow node whose behavior is supplied by a user-written Rhai script.
//! The script declares ports, reacts to incoming messages and emits results
//! through port handles, while the node translates host lifecycle calls into
//! script hooks.
//!
//! ## Architecture
//!
//! - **Interpreter**: one process-wide Rhai engine behind a single lock
//! - **Session**: an isolated namespace per node, entered only under that lock
//! - **Loader / Dispatcher**: run script text, then call its hooks by name
//! - **Marshaler**: expose node ports to scripts as typed handles
//! - **ScriptNode**: the adapter the host graph drives
//!
//! ## Configuration
//!
//! Settings are stored as TOML in the platform-appropriate config directory
//! under `dev.hxyulin.scriptnode`:
//!
//! - **Linux**: `~/.config/dev.hxyulin.scriptnode/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.scriptnode/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.scriptnode\`
//!
//! ## Example
//!
//! ```ignore
//! use scriptnode::{
//!     config::ScriptNodeSettings,
//!     pipeline::{DataflowNode, Message, NodeId, PortRegistry, ScriptNode},
//! };
//!
//! fn main() -> scriptnode::Result<()> {
//!     let settings = ScriptNodeSettings::load_or_default();
//!     let _guard = scriptnode::logging::init_logging(&settings.logging)?;
//!
//!     let ports = PortRegistry::shared();
//!     let mut node = ScriptNode::with_settings(NodeId(1), "doubler", settings).with_code(
//!         r#"
//!         fn setup(reg) { add_input(reg, "x"); add_output(reg, "y"); }
//!         fn process() { write(outputs[0], read_int(inputs[0]) * 2); }
//!         "#,
//!     );
//!     node.setup(ports.clone())?;
//!
//!     ports.write().unwrap().deliver_to("x", Message::value(21i64));
//!     if node.can_process() {
//!         node.process();
//!     }
//!     node.teardown();
//!     scriptnode::scripting::Interpreter::global()?.finalize()
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod scripting;

// Re-export commonly used types
pub use config::{NodeState, ScriptNodeSettings};
pub use error::{Diagnostic, Result, ScriptError};
pub use pipeline::{DataflowNode, NodeConstructor, NodeId, ScriptNode};
pub use scripting::{Interpreter, Session};
