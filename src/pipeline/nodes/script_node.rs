//! ScriptNode: a dataflow node whose behavior is a user-provided Rhai script.
//!
//! The node owns one interpreter [`Session`], created on the first load.
//! Every code edit, persisted-state reload and port-count change runs the
//! whole script again against freshly marshaled port handles. Lifecycle
//! calls from the graph are forwarded to the matching script hooks, and
//! whatever the script raises is captured, stored as [`ScriptNode::last_error`]
//! and reported to the node's [`DiagnosticSink`](crate::pipeline::bridge::DiagnosticSink).
//!
//! ## State machine
//!
//! ```text
//! Uninitialized ──► Loading ──► Ready ──► Loading ...
//!                      │                     │
//!                      └──► Failed ◄─────────┘
//!                             │
//!                             └──► Loading (next edit or port change)
//!
//! any state ──► TornDown (terminal)
//! ```
//!
//! Hooks are dispatched only while `Ready`. A hook that raises does not
//! change the state: the failing call is skipped and the next one is tried
//! normally.
//!
//! ## Example
//!
//! ```rhai
//! fn setup(reg) {
//!     add_input(reg, "in");
//!     add_output(reg, "out");
//! }
//!
//! fn process() {
//!     let a = read(inputs[0]);
//!     write(outputs[0], a);
//! }
//! ```

use crate::config::{NodeState, ScriptNodeSettings};
use crate::error::{Diagnostic, Result, ScriptError};
use crate::pipeline::bridge::{SharedSink, TracingSink};
use crate::pipeline::id::NodeId;
use crate::pipeline::message::Marker;
use crate::pipeline::node::DataflowNode;
use crate::pipeline::port::{PortKind, PortRegistry, SharedPorts};
use crate::scripting::{dispatch, loader, Hook, HookTable, PortRegistrar, Session, SessionId};
use std::sync::{Arc, PoisonError};

/// Lifecycle state of a script node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No code has been loaded yet.
    Uninitialized,
    /// A load is in progress.
    Loading,
    /// The last load succeeded; hooks are dispatched.
    Ready,
    /// The last load failed; nothing is dispatched until the next load.
    Failed,
    /// The session has been destroyed. Terminal.
    TornDown,
}

/// A pipeline node that delegates its behavior to a Rhai script.
pub struct ScriptNode {
    id: NodeId,
    /// Human-readable name for this node instance.
    name: String,
    /// Current script source.
    code: String,
    ports: SharedPorts,
    session: Option<Session>,
    state: LifecycleState,
    /// Port generation of the most recent load attempt.
    loaded_generation: Option<u64>,
    /// Hooks found by the most recent successful load.
    hooks: HookTable,
    last_error: Option<Diagnostic>,
    settings: ScriptNodeSettings,
    sink: SharedSink,
}

impl ScriptNode {
    /// Create a node with default settings. Nothing is loaded until setup or an edit.
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self::with_settings(id, name, ScriptNodeSettings::default())
    }

    pub fn with_settings(id: NodeId, name: impl Into<String>, settings: ScriptNodeSettings) -> Self {
        Self {
            id,
            name: name.into(),
            code: settings.default_code.clone(),
            ports: PortRegistry::shared(),
            session: None,
            state: LifecycleState::Uninitialized,
            loaded_generation: None,
            hooks: HookTable::default(),
            last_error: None,
            settings,
            sink: Arc::new(TracingSink),
        }
    }

    /// Replace the code before the first load.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    /// Send captured diagnostics to `sink` instead of the log.
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current script source.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LifecycleState::Ready
    }

    /// The most recent captured failure, cleared by the next successful load.
    pub fn last_error(&self) -> Option<&Diagnostic> {
        self.last_error.as_ref()
    }

    /// Hooks defined by the most recent successful load.
    pub fn hooks(&self) -> &HookTable {
        &self.hooks
    }

    pub fn ports(&self) -> &SharedPorts {
        &self.ports
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(Session::id)
    }

    /// Replace the script and load it.
    ///
    /// A script that fails to load is not an error here: the node moves to
    /// `Failed` and the diagnostic goes to the sink. Only a node that can no
    /// longer reach the interpreter returns `Err`.
    pub fn set_code(&mut self, code: impl Into<String>) -> Result<()> {
        self.check_alive()?;
        self.code = code.into();
        self.reload()
    }

    /// Run the current code again from scratch.
    pub fn reload(&mut self) -> Result<()> {
        self.check_alive()?;
        self.state = LifecycleState::Loading;
        self.loaded_generation = Some(self.current_generation());

        if let Err(e) = self.ensure_session() {
            self.hooks = HookTable::default();
            self.state = LifecycleState::Failed;
            self.record_failure(&e);
            return Err(e);
        }
        let result = match self.session.as_mut() {
            Some(session) => loader::load(session, &self.code),
            None => Err(ScriptError::InterpreterUnavailable(format!(
                "{} has no session",
                self.id
            ))),
        };

        match result {
            Ok(report) => {
                self.hooks = report.hooks;
                self.loaded_generation = Some(report.generation);
                self.last_error = None;
                self.state = LifecycleState::Ready;
                Ok(())
            }
            Err(e) => {
                self.hooks = HookTable::default();
                self.state = LifecycleState::Failed;
                self.record_failure(&e);
                if e.is_fatal() {
                    Err(e)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Reload if nothing was loaded yet or the ports changed since the last
    /// attempt. Returns whether hooks may be dispatched.
    pub fn ensure_loaded(&mut self) -> bool {
        if self.state == LifecycleState::TornDown {
            return false;
        }

        let stale = self.state == LifecycleState::Uninitialized
            || self.loaded_generation != Some(self.current_generation());
        if stale {
            tracing::debug!("Ports of {} changed, reloading script", self.id);
            if let Err(e) = self.reload() {
                tracing::warn!("Reload of {} failed: {}", self.id, e);
            }
        }
        self.is_ready()
    }

    /// Whether the loaded script defines `name`, checked against the live namespace.
    pub fn has_hook(&mut self, name: &str) -> bool {
        match self.session.as_mut() {
            Some(session) => dispatch::exists(session, name),
            None => false,
        }
    }

    /// Serialize the node state (the code) as JSON.
    pub fn save_state(&self) -> Result<String> {
        NodeState::new(self.code.clone()).to_json()
    }

    /// Restore the code from JSON written by [`ScriptNode::save_state`] and load it.
    pub fn load_state(&mut self, json: &str) -> Result<()> {
        let state = NodeState::from_json(json)?;
        self.set_code(state.code)
    }

    /// Destroy the session. Later lifecycle calls do nothing.
    pub fn teardown(&mut self) {
        if self.state == LifecycleState::TornDown {
            return;
        }
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.destroy() {
                tracing::warn!("Failed to tear down {}: {}", self.id, e);
            }
        }
        self.hooks = HookTable::default();
        self.state = LifecycleState::TornDown;
        tracing::debug!("Script node {} torn down", self.id);
    }

    fn check_alive(&self) -> Result<()> {
        if self.state == LifecycleState::TornDown {
            return Err(ScriptError::InterpreterUnavailable(format!(
                "{} has been torn down",
                self.id
            )));
        }
        Ok(())
    }

    fn current_generation(&self) -> u64 {
        self.ports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation()
    }

    fn ensure_session(&mut self) -> Result<()> {
        if self.session.is_none() {
            let mut session = Session::create(self.id, self.ports.clone())?;
            session.set_default_frame(self.settings.default_frame.clone());
            session.set_echo_output(self.settings.echo_script_output);
            self.session = Some(session);
        }
        Ok(())
    }

    fn record_failure(&mut self, err: &ScriptError) {
        let diagnostic = match err.diagnostic() {
            Some(d) => d.clone(),
            None => Diagnostic::new("ScriptError", err.to_string()).for_node(self.id),
        };
        self.sink.report(&diagnostic);
        self.last_error = Some(diagnostic);
    }

    /// Invoke `hook` if the node is ready and the script defines it.
    fn call_hook(&mut self, hook: Hook, registrar: bool) {
        if !self.ensure_loaded() || !self.hooks.is_defined(hook) {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let registrar = registrar.then(|| PortRegistrar::new(session.id()));
        if let Err(e) = dispatch::invoke(session, hook.name(), registrar) {
            self.record_failure(&e);
        }
    }

    fn inputs_available(&self) -> bool {
        let ports = self.ports.read().unwrap_or_else(PoisonError::into_inner);
        let ready = ports
            .ports(PortKind::Input)
            .filter(|p| !p.parameter && !p.optional)
            .all(|p| p.current.is_some());
        ready
    }
}

impl DataflowNode for ScriptNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, ports: SharedPorts) -> Result<()> {
        self.check_alive()?;

        // A session is bound to one registry
        if !Arc::ptr_eq(&self.ports, &ports) {
            self.ports = ports;
            if let Some(mut session) = self.session.take() {
                session.destroy()?;
            }
        }

        self.reload()?;
        self.call_hook(Hook::Setup, true);

        // Let the script see ports its setup added
        if self.loaded_generation != Some(self.current_generation()) {
            self.reload()?;
        }
        Ok(())
    }

    fn can_tick(&self) -> bool {
        self.is_ready() && self.hooks.is_defined(Hook::Tick)
    }

    fn tick(&mut self) {
        self.call_hook(Hook::Tick, false);
    }

    fn can_process(&self) -> bool {
        self.is_ready() && self.inputs_available()
    }

    fn process(&mut self) {
        self.call_hook(Hook::Process, false);
    }

    fn process_marker(&mut self, marker: Marker) {
        self.call_hook(Hook::for_marker(marker), false);
    }

    fn port_count_changed(&mut self) {
        if self.state == LifecycleState::TornDown {
            return;
        }
        if let Err(e) = self.reload() {
            tracing::warn!("Reload of {} after port change failed: {}", self.id, e);
        }
    }
}

impl Drop for ScriptNode {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for ScriptNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("code_len", &self.code.len())
            .field("state", &self.state)
            .field("hooks", &self.hooks.defined())
            .field("last_error", &self.last_error)
            .finish()
    }
}
