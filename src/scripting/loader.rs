//! Script loading.
//!
//! Every load starts from scratch: fresh handles from the current ports,
//! a fresh scope and the script body run top to bottom. A load that fails
//! leaves the namespace empty and not ready, so nothing from an earlier
//! successful load stays callable.

use crate::error::{Diagnostic, Result, ScriptError};
use crate::pipeline::port::PortKind;
use crate::scripting::dispatch::{Hook, HookTable};
use crate::scripting::marshal::HandleTable;
use crate::scripting::session::Session;
use rhai::{Dynamic, Scope};
use std::sync::{Arc, PoisonError};

/// Names the handle sequences are bound under.
pub const HANDLE_BINDINGS: [(&str, PortKind); 4] = [
    ("inputs", PortKind::Input),
    ("outputs", PortKind::Output),
    ("slots", PortKind::Slot),
    ("events", PortKind::Event),
];

/// Result of a successful load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    /// Whether the script defines `tick`.
    pub can_tick: bool,
    pub hooks: HookTable,
    /// Output printed by the script body.
    pub output: Vec<String>,
    /// Port generation the handles were built against.
    pub generation: u64,
}

/// Execute `source` in the session's namespace, replacing whatever it held.
pub fn load(session: &mut Session, source: &str) -> Result<LoadReport> {
    let node = session.node();

    session.with_lock(|ctx| {
        let handles = {
            let ports = ctx.ports().read().unwrap_or_else(PoisonError::into_inner);
            Arc::new(HandleTable::marshal(ctx.session_id(), &ports))
        };
        let generation = handles.generation;
        ctx.bind_handles(handles.clone());

        let engine = ctx.engine();
        let ast = match engine.compile(source) {
            Ok(ast) => ast,
            Err(err) => {
                ctx.namespace().clear();
                let diagnostic = Diagnostic::from_parse(&err).for_node(node);
                tracing::warn!("Script for {} failed to compile: {}", node, diagnostic);
                return Err(ScriptError::LoadFailure(diagnostic));
            }
        };

        let mut scope = Scope::new();
        for (name, kind) in HANDLE_BINDINGS {
            scope.push_constant(name, Dynamic::from_array(handles.to_array(kind)));
        }

        let result = engine.run_ast_with_scope(&mut scope, &ast);
        let output = ctx.flush();
        let ns = ctx.namespace();

        match result {
            Ok(()) => {
                ns.hooks = HookTable::from_ast(&ast);
                ns.scope = scope;
                ns.ast = ast;
                ns.handles = handles;
                ns.ready = true;

                tracing::debug!("Loaded script for {}: hooks {:?}", node, ns.hooks.defined());
                Ok(LoadReport {
                    can_tick: ns.hooks.is_defined(Hook::Tick),
                    hooks: ns.hooks.clone(),
                    output,
                    generation,
                })
            }
            Err(err) => {
                ns.clear();
                let diagnostic = Diagnostic::from_eval(&err).for_node(node).with_output(output);
                tracing::warn!("Script for {} raised while loading: {}", node, diagnostic);
                Err(ScriptError::LoadFailure(diagnostic))
            }
        }
    })?
}
