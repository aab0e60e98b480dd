//! Lifecycle hook lookup and invocation.
//!
//! [`exists`] is the cheap probe: it never fails, and a session that cannot
//! be entered simply has no hooks. [`invoke`] holds the interpreter lock for
//! the whole call and turns anything the script raises into a
//! [`ScriptError::CallbackFailure`].

use crate::error::{Diagnostic, Result, ScriptError};
use crate::pipeline::message::Marker;
use crate::scripting::marshal::PortRegistrar;
use crate::scripting::session::Session;
use rhai::{CallFnOptions, Dynamic, AST};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known callables a script may define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hook {
    Setup,
    Tick,
    Process,
    ProcessNoMessage,
    ProcessEndOfSequence,
    ProcessEndOfProgram,
}

impl Hook {
    pub fn name(&self) -> &'static str {
        match self {
            Hook::Setup => "setup",
            Hook::Tick => "tick",
            Hook::Process => "process",
            Hook::ProcessNoMessage => "processNoMessage",
            Hook::ProcessEndOfSequence => "processEndOfSequence",
            Hook::ProcessEndOfProgram => "processEndOfProgram",
        }
    }

    pub fn all() -> &'static [Hook] {
        &[
            Hook::Setup,
            Hook::Tick,
            Hook::Process,
            Hook::ProcessNoMessage,
            Hook::ProcessEndOfSequence,
            Hook::ProcessEndOfProgram,
        ]
    }

    pub fn from_name(name: &str) -> Option<Hook> {
        Hook::all().iter().copied().find(|h| h.name() == name)
    }

    /// The hook a marker token is routed to.
    pub fn for_marker(marker: Marker) -> Hook {
        match marker {
            Marker::NoMessage => Hook::ProcessNoMessage,
            Marker::EndOfSequence => Hook::ProcessEndOfSequence,
            Marker::EndOfProgram => Hook::ProcessEndOfProgram,
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared parameter counts of each lifecycle hook the script defines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookTable {
    arities: BTreeMap<Hook, Vec<usize>>,
}

impl HookTable {
    /// Collect hooks from the functions defined in `ast`.
    pub fn from_ast(ast: &AST) -> Self {
        let mut arities: BTreeMap<Hook, Vec<usize>> = BTreeMap::new();
        for f in ast.iter_functions() {
            if let Some(hook) = Hook::from_name(f.name) {
                arities.entry(hook).or_default().push(f.params.len());
            }
        }
        Self { arities }
    }

    pub fn is_defined(&self, hook: Hook) -> bool {
        self.arities.contains_key(&hook)
    }

    /// Whether `hook` has an overload taking `arity` parameters.
    pub fn accepts(&self, hook: Hook, arity: usize) -> bool {
        self.arities
            .get(&hook)
            .is_some_and(|arities| arities.contains(&arity))
    }

    /// Defined hooks, in lifecycle order.
    pub fn defined(&self) -> Vec<Hook> {
        self.arities.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.arities.is_empty()
    }
}

/// Whether the session is ready and its script defines a callable `name`.
pub fn exists(session: &mut Session, name: &str) -> bool {
    let found = session.with_lock(|ctx| {
        let ns = ctx.namespace();
        if !ns.is_ready() {
            return false;
        }
        match Hook::from_name(name) {
            Some(hook) => ns.hooks().is_defined(hook),
            None => ns.has_function(name, None),
        }
    });

    match found {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!("Lookup of '{}' in {} failed: {}", name, session.id(), e);
            false
        }
    }
}

/// Call `name` in the session's namespace.
///
/// `registrar` is passed only when the script declares a one-parameter
/// overload; otherwise the function is called without arguments.
pub fn invoke(session: &mut Session, name: &str, registrar: Option<PortRegistrar>) -> Result<Dynamic> {
    let node = session.node();
    tracing::trace!("Invoking '{}' on {}", name, node);

    session.with_lock(|ctx| {
        let engine = ctx.engine();
        let ns = ctx.namespace();
        if !ns.is_ready() {
            return Err(ScriptError::CallbackFailure {
                hook: name.to_string(),
                diagnostic: Diagnostic::new("NotReady", "script is not loaded").for_node(node),
            });
        }

        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let result = match registrar {
            Some(reg) if ns.has_function(name, Some(1)) => {
                engine.call_fn_with_options::<Dynamic>(options, &mut ns.scope, &ns.ast, name, (reg,))
            }
            _ => engine.call_fn_with_options::<Dynamic>(options, &mut ns.scope, &ns.ast, name, ()),
        };
        let output = ctx.flush();

        result.map_err(|err| {
            let diagnostic = Diagnostic::from_hook(name, &err)
                .for_node(node)
                .with_output(output);
            tracing::warn!("Script hook '{}' on {} failed: {}", name, node, diagnostic);
            ScriptError::CallbackFailure {
                hook: name.to_string(),
                diagnostic,
            }
        })
    })?
}
