//! Embedded Rhai scripting for dataflow nodes
//!
//! Each script node owns a [`Session`], an isolated sub-context of one
//! process-wide [`Interpreter`]. All sessions share a single lock, so only
//! one script runs at a time anywhere in the process.
//!
//! ## Lifecycle hooks
//!
//! A script may define any of these functions; all are optional:
//!
//! - `setup(reg)` / `setup()` - Called once when the node is set up. The
//!   one-parameter form receives a registrar for adding ports.
//! - `tick()` - Called periodically by the host. Defining it enables ticking.
//! - `process()` - Called when every input holds a message.
//! - `processNoMessage()`, `processEndOfSequence()`, `processEndOfProgram()` -
//!   Called for the matching marker token instead of `process()`.
//!
//! ## Port handles
//!
//! The node's ports are bound as `inputs`, `outputs`, `slots` and `events`,
//! arrays of handles visible everywhere in the script, including inside
//! functions. Handles are rebuilt on every load; see [`marshal`] for the
//! functions that accept them.
//!
//! ## Example Scripts
//!
//! Forwarding the first input:
//! ```rhai
//! fn process() {
//!     write(outputs[0], read(inputs[0]));
//! }
//! ```
//!
//! Declaring ports from setup:
//! ```rhai
//! fn setup(reg) {
//!     add_input(reg, "value");
//!     add_output(reg, "doubled");
//! }
//!
//! fn process() {
//!     write(output("doubled"), read_float(input("value")) * 2.0, "/base");
//! }
//! ```

pub mod dispatch;
pub mod interpreter;
pub mod loader;
pub mod marshal;
pub mod session;

pub use dispatch::{exists, invoke, Hook, HookTable};
pub use interpreter::{Interpreter, SessionId};
pub use loader::{load, LoadReport};
pub use marshal::{HandleTable, PortHandle, PortRegistrar};
pub use session::{ActiveContext, Namespace, Session};

/// Template scripts offered for new nodes
pub mod templates {
    /// Code given to a freshly created script node
    pub const DEFAULT_CODE: &str = r#"
let test = 0;

fn setup(reg) {
    print("setup");
}

fn tick() {
    print("tick " + test);
    test += 1;
}

fn process() {
    print("process");
}
"#;

    /// Forward one input to one output, declaring both ports in setup
    pub const PASSTHROUGH: &str = r#"
fn setup(reg) {
    add_input(reg, "in");
    add_output(reg, "out");
}

fn process() {
    write(outputs[0], read(inputs[0]), frame(inputs[0]));
}
"#;

    /// Forward messages and fire an event at the end of each sequence
    pub const SEQUENCE_RELAY: &str = r#"
fn setup(reg) {
    add_input(reg, "in");
    add_output(reg, "out");
    add_event(reg, "sequence_done");
}

fn process() {
    write(outputs[0], read(inputs[0]));
}

fn processEndOfSequence() {
    trigger(event("sequence_done"));
}
"#;

    /// An empty script that defines no hooks
    pub const EMPTY: &str = "";

    /// List of all templates with names
    pub fn all() -> Vec<(&'static str, &'static str)> {
        vec![
            ("Default", DEFAULT_CODE),
            ("Passthrough", PASSTHROUGH),
            ("Sequence Relay", SEQUENCE_RELAY),
            ("Empty", EMPTY),
        ]
    }
}
