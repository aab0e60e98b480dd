//! Per-node interpreter sessions.
//!
//! A [`Session`] is one isolated sub-context of the shared interpreter: its
//! own [`Namespace`] (variable scope plus the compiled script holding the
//! node's functions) and its own registration in the process-wide registry.
//! The namespace is only reachable through [`Session::with_lock`], which
//! serializes entry across every session in the process.

use crate::error::{Result, ScriptError};
use crate::pipeline::id::NodeId;
use crate::pipeline::message::DEFAULT_FRAME;
use crate::pipeline::port::SharedPorts;
use crate::scripting::dispatch::HookTable;
use crate::scripting::interpreter::{ActiveBinding, ContextGuard, Interpreter, SessionId};
use crate::scripting::marshal::HandleTable;
use rhai::{Engine, Scope, AST};
use std::fmt;
use std::sync::Arc;

/// Variables and script-defined functions of one session.
pub struct Namespace {
    pub(crate) scope: Scope<'static>,
    pub(crate) ast: AST,
    pub(crate) handles: Arc<HandleTable>,
    pub(crate) ready: bool,
    pub(crate) hooks: HookTable,
}

impl Namespace {
    fn new() -> Self {
        Self {
            scope: Scope::new(),
            ast: AST::empty(),
            handles: Arc::new(HandleTable::default()),
            ready: false,
            hooks: HookTable::default(),
        }
    }

    /// Whether the last load bound the handles and ran the script body cleanly.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn hooks(&self) -> &HookTable {
        &self.hooks
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// Whether the script defines `name`, optionally with a given parameter count.
    pub fn has_function(&self, name: &str, arity: Option<usize>) -> bool {
        self.ast
            .iter_functions()
            .any(|f| f.name == name && arity.map_or(true, |n| f.params.len() == n))
    }

    /// Drop every script binding, leaving the namespace not ready.
    pub(crate) fn clear(&mut self) {
        self.scope.clear();
        self.ast = AST::empty();
        self.handles = Arc::new(HandleTable::default());
        self.hooks = HookTable::default();
        self.ready = false;
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("variables", &self.scope.len())
            .field("functions", &self.ast.iter_functions().count())
            .field("ready", &self.ready)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// One node's sub-context of the shared interpreter.
pub struct Session {
    id: SessionId,
    node: NodeId,
    interpreter: &'static Interpreter,
    ports: SharedPorts,
    namespace: Namespace,
    default_frame: String,
    echo_output: bool,
    initialized: bool,
}

impl Session {
    /// Register a new sub-context for `node`, starting the interpreter on first use.
    pub fn create(node: NodeId, ports: SharedPorts) -> Result<Self> {
        let interpreter = Interpreter::global()?;
        let id = interpreter.open_context()?;
        tracing::debug!("Created script session {} for {}", id, node);

        Ok(Self {
            id,
            node,
            interpreter,
            ports,
            namespace: Namespace::new(),
            default_frame: DEFAULT_FRAME.to_string(),
            echo_output: true,
            initialized: true,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn ports(&self) -> &SharedPorts {
        &self.ports
    }

    pub fn is_alive(&self) -> bool {
        self.initialized
    }

    /// Frame tag used by `write(h, value)` when the script names none.
    pub fn set_default_frame(&mut self, frame: impl Into<String>) {
        self.default_frame = frame.into();
    }

    /// Log script output at info level instead of debug.
    pub fn set_echo_output(&mut self, echo: bool) {
        self.echo_output = echo;
    }

    /// Run `f` with the interpreter lock held and this session switched in.
    ///
    /// The lock is released and the session switched out on every exit path.
    pub fn with_lock<R>(&mut self, f: impl FnOnce(&mut ActiveContext<'_>) -> R) -> Result<R> {
        if !self.initialized {
            return Err(ScriptError::InterpreterUnavailable(format!(
                "{} has been destroyed",
                self.id
            )));
        }

        let binding = ActiveBinding {
            session: self.id,
            node: self.node,
            ports: self.ports.clone(),
            handles: self.namespace.handles.clone(),
            default_frame: self.default_frame.clone(),
            echo_output: self.echo_output,
            output: Vec::new(),
        };
        let guard = self.interpreter.enter(binding)?;

        let mut ctx = ActiveContext {
            guard,
            namespace: &mut self.namespace,
            ports: &self.ports,
            session: self.id,
        };
        Ok(f(&mut ctx))
    }

    /// End the sub-context. Later calls are no-ops.
    pub fn destroy(&mut self) -> Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;
        self.namespace.clear();
        self.interpreter.close_context(self.id);
        tracing::debug!("Destroyed script session {} for {}", self.id, self.node);
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            tracing::warn!("Failed to destroy script session {}: {}", self.id, e);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("initialized", &self.initialized)
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// A session switched in under the interpreter lock.
pub struct ActiveContext<'a> {
    guard: ContextGuard,
    namespace: &'a mut Namespace,
    ports: &'a SharedPorts,
    session: SessionId,
}

impl ActiveContext<'_> {
    pub fn engine(&self) -> &'static Engine {
        self.guard.engine()
    }

    pub fn namespace(&mut self) -> &mut Namespace {
        &mut *self.namespace
    }

    pub fn ports(&self) -> &SharedPorts {
        self.ports
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    /// Drain and log script output produced so far.
    pub fn flush(&self) -> Vec<String> {
        self.guard.flush()
    }

    /// Make `handles` the table host functions resolve against for the rest of this entry.
    pub fn bind_handles(&mut self, handles: Arc<HandleTable>) {
        self.guard.bind_handles(handles.clone());
        self.namespace.handles = handles;
    }
}
