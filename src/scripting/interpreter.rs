//! Process-wide interpreter state.
//!
//! One [`Interpreter`] exists per process. It owns the shared Rhai engine,
//! the lock that serializes every entry into any session, the registry of
//! live sub-contexts and the *active binding*: the ports, handles and output
//! buffer of whichever session currently holds the lock. Host functions
//! registered on the engine reach the node they serve only through that
//! binding.
//!
//! ```text
//!   with_lock ─► lock registry ─► switch in (active = S, binding = S)
//!                                   │
//!                                   ▼
//!                              run closure ─► host fns read binding
//!                                   │
//!   release   ◄─ unlock ◄─ switch out (flush output, active = None)
//! ```
//!
//! Teardown via [`Interpreter::finalize`] is only accepted while no session
//! is alive.

use crate::error::{Result, ScriptError};
use crate::pipeline::id::NodeId;
use crate::pipeline::port::SharedPorts;
use crate::scripting::marshal::{self, HandleTable};
use rhai::Engine;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};

static INTERPRETER: OnceLock<std::result::Result<Interpreter, String>> = OnceLock::new();

/// Opaque handle of one interpreter sub-context.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What host functions see of the session currently holding the lock.
pub(crate) struct ActiveBinding {
    pub session: SessionId,
    pub node: NodeId,
    pub ports: SharedPorts,
    pub handles: Arc<HandleTable>,
    pub default_frame: String,
    pub echo_output: bool,
    /// Buffered `print`/`debug` output, drained on flush.
    pub output: Vec<String>,
}

/// Slot holding the active binding. Written only while the registry lock is held.
pub(crate) type ActiveSlot = Arc<RwLock<Option<ActiveBinding>>>;

#[derive(Debug, Default)]
struct ContextRegistry {
    live: HashSet<SessionId>,
    active: Option<SessionId>,
    next_id: u64,
    finalized: bool,
}

/// The shared interpreter: engine, lock and sub-context registry.
pub struct Interpreter {
    engine: Engine,
    registry: Mutex<ContextRegistry>,
    active: ActiveSlot,
}

impl Interpreter {
    /// Get the process-wide interpreter, starting it on first use.
    pub fn global() -> Result<&'static Interpreter> {
        let interpreter = INTERPRETER
            .get_or_init(Interpreter::start)
            .as_ref()
            .map_err(|e| ScriptError::InterpreterUnavailable(e.clone()))?;

        if interpreter.lock_registry().finalized {
            return Err(ScriptError::InterpreterUnavailable(
                "interpreter has been finalized".to_string(),
            ));
        }
        Ok(interpreter)
    }

    fn start() -> std::result::Result<Interpreter, String> {
        std::panic::catch_unwind(|| {
            let active: ActiveSlot = Arc::new(RwLock::new(None));
            let mut engine = Engine::new();
            // Built-in operators only report error positions on the regular call path
            engine.set_fast_operators(false);
            marshal::register_host_api(&mut engine, active.clone());

            Interpreter {
                engine,
                registry: Mutex::new(ContextRegistry::default()),
                active,
            }
        })
        .map(|interpreter| {
            tracing::debug!("Script interpreter initialized");
            interpreter
        })
        .map_err(|panic| {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("Script interpreter failed to start: {}", reason);
            format!("interpreter initialization failed: {}", reason)
        })
    }

    /// The shared engine. Only use it inside a session's locked scope.
    pub(crate) fn engine(&'static self) -> &'static Engine {
        &self.engine
    }

    fn lock_registry(&self) -> MutexGuard<'_, ContextRegistry> {
        // The context guard restores the active pointer while unwinding, so a
        // poisoned registry is still consistent.
        self.registry.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Interpreter lock was poisoned by a panicking session, recovering");
            self.registry.clear_poison();
            poisoned.into_inner()
        })
    }

    /// Number of sub-contexts currently alive.
    pub fn live_sessions(&self) -> usize {
        self.lock_registry().live.len()
    }

    #[cfg(test)]
    pub(crate) fn is_live(&self, id: SessionId) -> bool {
        self.lock_registry().live.contains(&id)
    }

    pub fn is_finalized(&self) -> bool {
        self.lock_registry().finalized
    }

    /// Shut the interpreter down for the rest of the process.
    ///
    /// Refused with [`ScriptError::SessionsAlive`] while any session exists.
    /// Afterwards every entry point reports `InterpreterUnavailable`.
    pub fn finalize(&self) -> Result<()> {
        let mut registry = self.lock_registry();
        if registry.finalized {
            return Ok(());
        }
        if !registry.live.is_empty() {
            tracing::warn!(
                "Refusing to finalize interpreter with {} live session(s)",
                registry.live.len()
            );
            return Err(ScriptError::SessionsAlive(registry.live.len()));
        }
        registry.finalized = true;
        tracing::debug!("Script interpreter finalized");
        Ok(())
    }

    pub(crate) fn open_context(&self) -> Result<SessionId> {
        let mut registry = self.lock_registry();
        if registry.finalized {
            return Err(ScriptError::InterpreterUnavailable(
                "interpreter has been finalized".to_string(),
            ));
        }
        let id = SessionId(registry.next_id);
        registry.next_id += 1;
        registry.live.insert(id);
        Ok(id)
    }

    pub(crate) fn close_context(&self, id: SessionId) {
        let mut registry = self.lock_registry();
        registry.live.remove(&id);
        if registry.active == Some(id) {
            registry.active = None;
        }
    }

    /// Acquire the lock and make `binding`'s session the active context.
    pub(crate) fn enter(&'static self, binding: ActiveBinding) -> Result<ContextGuard> {
        let mut registry = self.lock_registry();
        if registry.finalized {
            return Err(ScriptError::InterpreterUnavailable(
                "interpreter has been finalized".to_string(),
            ));
        }
        if !registry.live.contains(&binding.session) {
            return Err(ScriptError::InterpreterUnavailable(format!(
                "{} is not a live sub-context",
                binding.session
            )));
        }

        registry.active = Some(binding.session);
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(binding);

        Ok(ContextGuard {
            interpreter: self,
            registry,
        })
    }
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.lock_registry();
        f.debug_struct("Interpreter")
            .field("live", &registry.live.len())
            .field("active", &registry.active)
            .field("finalized", &registry.finalized)
            .finish()
    }
}

/// Holds the interpreter lock with one session switched in.
///
/// Dropping the guard flushes remaining output, switches the session out
/// and releases the lock, including while unwinding.
pub(crate) struct ContextGuard {
    interpreter: &'static Interpreter,
    registry: MutexGuard<'static, ContextRegistry>,
}

impl ContextGuard {
    pub fn engine(&self) -> &'static Engine {
        self.interpreter.engine()
    }

    /// Replace the handle table host functions resolve against.
    pub fn bind_handles(&self, handles: Arc<HandleTable>) {
        if let Some(binding) = self
            .interpreter
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            binding.handles = handles;
        }
    }

    /// Drain buffered script output into the log and return it.
    pub fn flush(&self) -> Vec<String> {
        let mut slot = self
            .interpreter
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(binding) = slot.as_mut() else {
            return Vec::new();
        };

        let lines = std::mem::take(&mut binding.output);
        for line in &lines {
            if binding.echo_output {
                tracing::info!(target: "script", node = %binding.node, "{}", line);
            } else {
                tracing::debug!(target: "script", node = %binding.node, "{}", line);
            }
        }
        lines
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.flush();
        *self
            .interpreter
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.registry.active = None;
    }
}
