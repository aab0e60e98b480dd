//! Handle marshaling between host ports and scripts.
//!
//! Scripts never touch host ports directly. A load turns the node's
//! [`PortRegistry`] into a [`HandleTable`] of [`PortHandle`]s, small values
//! naming a port by id plus the registry generation they were built against.
//! Host functions registered by [`register_host_api`] take a handle back,
//! check it against the active binding and only then read, publish or
//! trigger.
//!
//! ## Host functions
//!
//! - `read(h)`, `read_int(h)`, `read_float(h)`, `read_string(h)`, `read_bool(h)`
//! - `has_message(h)`, `frame(h)`
//! - `write(h, value)`, `write(h, value, frame)`
//! - `trigger(h)`
//! - `label(h)`, `kind(h)` (also available as `h.label`, `h.kind`)
//! - `input(label)`, `output(label)`, `slot(label)`, `event(label)`
//! - Registrar, passed to `setup(reg)`: `add_input(reg, label)`,
//!   `add_input(reg, label, optional)`, `add_output(reg, label)`,
//!   `add_slot(reg, label)`, `add_event(reg, label)`, `remove_port(reg, label)`
//!
//! Inputs and outputs flagged as parameters are not marshaled. Slots and
//! events always are.

use crate::error::{Result, ScriptError};
use crate::pipeline::id::PortId;
use crate::pipeline::message::{Message, Token, Value};
use crate::pipeline::port::{PortKind, PortRegistry};
use crate::scripting::interpreter::{ActiveBinding, ActiveSlot, SessionId};
use rhai::{Array, Dynamic, Engine, EvalAltResult, Position};
use std::fmt;
use std::sync::PoisonError;

type HostResult<T> = std::result::Result<T, Box<EvalAltResult>>;

/// Non-owning script-visible reference to one host port.
#[derive(Debug, Clone, PartialEq)]
pub struct PortHandle {
    owner: SessionId,
    kind: PortKind,
    port: PortId,
    generation: u64,
    label: String,
}

impl PortHandle {
    pub fn kind(&self) -> PortKind {
        self.kind
    }

    pub fn port(&self) -> PortId {
        self.port
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Check the handle against the session using it and the current ports.
    pub fn resolve(&self, session: SessionId, ports: &PortRegistry) -> Result<PortId> {
        let stale = |reason: String| ScriptError::StaleHandle {
            port: self.label.clone(),
            reason,
        };

        if self.owner != session {
            return Err(stale(format!("handle belongs to {}", self.owner)));
        }
        if self.generation != ports.generation() {
            return Err(stale(format!(
                "ports changed since load (generation {} != {})",
                self.generation,
                ports.generation()
            )));
        }
        match ports.get(self.port) {
            Some(port) if port.kind == self.kind => Ok(self.port),
            _ => Err(stale("port no longer exists".to_string())),
        }
    }
}

impl fmt::Display for PortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.label)
    }
}

/// The four handle sequences bound into a namespace.
#[derive(Debug, Clone, Default)]
pub struct HandleTable {
    pub inputs: Vec<PortHandle>,
    pub outputs: Vec<PortHandle>,
    pub slots: Vec<PortHandle>,
    pub events: Vec<PortHandle>,
    /// Registry generation the handles were built against.
    pub generation: u64,
}

impl HandleTable {
    /// Build fresh handles for `owner` from the current ports.
    pub fn marshal(owner: SessionId, ports: &PortRegistry) -> Self {
        let generation = ports.generation();
        let collect = |kind: PortKind, include_parameters: bool| {
            ports
                .ports(kind)
                .filter(|p| include_parameters || !p.parameter)
                .map(|p| PortHandle {
                    owner,
                    kind,
                    port: p.id,
                    generation,
                    label: p.label.clone(),
                })
                .collect::<Vec<_>>()
        };

        Self {
            inputs: collect(PortKind::Input, false),
            outputs: collect(PortKind::Output, false),
            slots: collect(PortKind::Slot, true),
            events: collect(PortKind::Event, true),
            generation,
        }
    }

    pub fn handles(&self, kind: PortKind) -> &[PortHandle] {
        match kind {
            PortKind::Input => &self.inputs,
            PortKind::Output => &self.outputs,
            PortKind::Slot => &self.slots,
            PortKind::Event => &self.events,
        }
    }

    pub fn find(&self, kind: PortKind, label: &str) -> Option<&PortHandle> {
        self.handles(kind).iter().find(|h| h.label == label)
    }

    /// Script array of the handles of one kind.
    pub fn to_array(&self, kind: PortKind) -> Array {
        self.handles(kind).iter().cloned().map(Dynamic::from).collect()
    }
}

/// Argument passed to a script's `setup(reg)`; adds and removes ports.
#[derive(Debug, Clone)]
pub struct PortRegistrar {
    owner: SessionId,
}

impl PortRegistrar {
    pub fn new(owner: SessionId) -> Self {
        Self { owner }
    }
}

// ── Value conversion ──

pub fn value_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Int(i) => Dynamic::from(*i),
        Value::Float(f) => Dynamic::from(*f),
        Value::Text(s) => Dynamic::from(s.clone()),
        Value::Bool(b) => Dynamic::from(*b),
        Value::List(items) => Dynamic::from_array(items.iter().map(value_to_dynamic).collect()),
    }
}

/// Convert a script value for publishing. `None` for unit, maps and custom types.
pub fn dynamic_to_value(value: Dynamic) -> Option<Value> {
    if value.is_int() {
        value.as_int().ok().map(Value::Int)
    } else if value.is_float() {
        value.as_float().ok().map(Value::Float)
    } else if value.is_bool() {
        value.as_bool().ok().map(Value::Bool)
    } else if value.is_string() {
        value.into_string().ok().map(Value::Text)
    } else if value.is_array() {
        let items = value.into_array().ok()?;
        items
            .into_iter()
            .map(dynamic_to_value)
            .collect::<Option<Vec<_>>>()
            .map(Value::List)
    } else {
        None
    }
}

// ── Host API ──

fn into_rhai(err: ScriptError) -> Box<EvalAltResult> {
    err.to_string().into()
}

fn with_active<T>(
    active: &ActiveSlot,
    f: impl FnOnce(&ActiveBinding) -> HostResult<T>,
) -> HostResult<T> {
    let slot = active.read().unwrap_or_else(PoisonError::into_inner);
    match slot.as_ref() {
        Some(binding) => f(binding),
        None => Err("no active script context".into()),
    }
}

fn expect_kind(handle: &PortHandle, kind: PortKind, op: &str) -> HostResult<()> {
    if handle.kind == kind {
        Ok(())
    } else {
        Err(format!("{}() expects a handle of kind '{}', got {}", op, kind, handle).into())
    }
}

/// Current message on an input, after validating the handle.
fn current_message(active: &ActiveSlot, handle: &PortHandle, op: &str) -> HostResult<Option<Message>> {
    expect_kind(handle, PortKind::Input, op)?;
    with_active(active, |binding| {
        let ports = binding.ports.read().unwrap_or_else(PoisonError::into_inner);
        let id = handle.resolve(binding.session, &ports).map_err(into_rhai)?;
        Ok(ports.get(id).and_then(|p| p.current.clone()))
    })
}

fn current_value(active: &ActiveSlot, handle: &PortHandle, op: &str) -> HostResult<Value> {
    match current_message(active, handle, op)? {
        Some(Message::Token(token)) => Ok(token.value),
        Some(Message::Marker(marker)) => {
            Err(format!("{} holds marker {:?}, not a value", handle, marker).into())
        }
        None => Err(format!("no message on {}", handle).into()),
    }
}

fn kind_mismatch(handle: &PortHandle, expected: &str, value: &Value) -> Box<EvalAltResult> {
    format!("{} holds a {}, expected {}", handle, value.kind(), expected).into()
}

fn publish(active: &ActiveSlot, handle: &PortHandle, value: Dynamic, frame: Option<String>) -> HostResult<()> {
    expect_kind(handle, PortKind::Output, "write")?;
    let type_name = value.type_name();
    let value = dynamic_to_value(value)
        .ok_or_else(|| format!("cannot write a value of type '{}' to {}", type_name, handle))?;

    with_active(active, |binding| {
        let mut ports = binding.ports.write().unwrap_or_else(PoisonError::into_inner);
        let id = handle.resolve(binding.session, &ports).map_err(into_rhai)?;
        let frame = frame.unwrap_or_else(|| binding.default_frame.clone());
        ports.publish(id, Message::Token(Token::with_frame(value, frame)));
        Ok(())
    })
}

fn lookup(active: &ActiveSlot, kind: PortKind, label: &str) -> HostResult<PortHandle> {
    with_active(active, |binding| {
        binding
            .handles
            .find(kind, label)
            .cloned()
            .ok_or_else(|| format!("no {} named '{}'", kind, label).into())
    })
}

fn modify_ports<T>(
    active: &ActiveSlot,
    registrar: &PortRegistrar,
    f: impl FnOnce(&mut PortRegistry) -> T,
) -> HostResult<T> {
    with_active(active, |binding| {
        if registrar.owner != binding.session {
            return Err("registrar belongs to another node".into());
        }
        let mut ports = binding.ports.write().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&mut ports))
    })
}

fn buffer_output(active: &ActiveSlot, line: String) {
    let mut slot = active.write().unwrap_or_else(PoisonError::into_inner);
    match slot.as_mut() {
        Some(binding) => binding.output.push(line),
        None => tracing::info!(target: "script", "{}", line),
    }
}

/// Register handle types, host functions and output capture on `engine`.
///
/// Every function reads the session currently switched in through `active`.
pub(crate) fn register_host_api(engine: &mut Engine, active: ActiveSlot) {
    engine.register_type_with_name::<PortHandle>("PortHandle");
    engine.register_type_with_name::<PortRegistrar>("PortRegistrar");

    // ===== Introspection =====

    engine.register_get("label", |h: &mut PortHandle| h.label.clone());
    engine.register_get("kind", |h: &mut PortHandle| h.kind.name().to_string());
    engine.register_fn("label", |h: PortHandle| h.label);
    engine.register_fn("kind", |h: PortHandle| h.kind.name().to_string());
    engine.register_fn("to_string", |h: &mut PortHandle| h.to_string());
    engine.register_fn("to_debug", |h: &mut PortHandle| format!("PortHandle({})", h));

    for (name, kind) in [
        ("input", PortKind::Input),
        ("output", PortKind::Output),
        ("slot", PortKind::Slot),
        ("event", PortKind::Event),
    ] {
        let slot = active.clone();
        engine.register_fn(name, move |label: &str| lookup(&slot, kind, label));
    }

    // ===== Reads =====

    {
        let slot = active.clone();
        engine.register_fn("read", move |h: PortHandle| -> HostResult<Dynamic> {
            Ok(match current_message(&slot, &h, "read")? {
                Some(Message::Token(token)) => value_to_dynamic(&token.value),
                _ => Dynamic::UNIT,
            })
        });
    }
    {
        let slot = active.clone();
        engine.register_fn("read_int", move |h: PortHandle| -> HostResult<i64> {
            let value = current_value(&slot, &h, "read_int")?;
            value.as_int().ok_or_else(|| kind_mismatch(&h, "int", &value))
        });
    }
    {
        let slot = active.clone();
        engine.register_fn("read_float", move |h: PortHandle| -> HostResult<f64> {
            let value = current_value(&slot, &h, "read_float")?;
            value.as_float().ok_or_else(|| kind_mismatch(&h, "float", &value))
        });
    }
    {
        let slot = active.clone();
        engine.register_fn("read_string", move |h: PortHandle| -> HostResult<String> {
            let value = current_value(&slot, &h, "read_string")?;
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| kind_mismatch(&h, "string", &value))
        });
    }
    {
        let slot = active.clone();
        engine.register_fn("read_bool", move |h: PortHandle| -> HostResult<bool> {
            let value = current_value(&slot, &h, "read_bool")?;
            value.as_bool().ok_or_else(|| kind_mismatch(&h, "bool", &value))
        });
    }
    {
        let slot = active.clone();
        engine.register_fn("has_message", move |h: PortHandle| -> HostResult<bool> {
            Ok(matches!(
                current_message(&slot, &h, "has_message")?,
                Some(Message::Token(_))
            ))
        });
    }
    {
        let slot = active.clone();
        engine.register_fn("frame", move |h: PortHandle| -> HostResult<String> {
            match current_message(&slot, &h, "frame")? {
                Some(Message::Token(token)) => Ok(token.frame),
                _ => Err(format!("no message on {}", h).into()),
            }
        });
    }

    // ===== Writes =====

    {
        let slot = active.clone();
        engine.register_fn("write", move |h: PortHandle, value: Dynamic| {
            publish(&slot, &h, value, None)
        });
    }
    {
        let slot = active.clone();
        engine.register_fn(
            "write",
            move |h: PortHandle, value: Dynamic, frame: &str| {
                publish(&slot, &h, value, Some(frame.to_string()))
            },
        );
    }
    {
        let slot = active.clone();
        engine.register_fn("trigger", move |h: PortHandle| -> HostResult<()> {
            expect_kind(&h, PortKind::Event, "trigger")?;
            with_active(&slot, |binding| {
                let mut ports = binding.ports.write().unwrap_or_else(PoisonError::into_inner);
                let id = h.resolve(binding.session, &ports).map_err(into_rhai)?;
                ports.signal(id);
                Ok(())
            })
        });
    }

    // ===== Registrar =====

    {
        let slot = active.clone();
        engine.register_fn("add_input", move |reg: PortRegistrar, label: &str| {
            modify_ports(&slot, &reg, |ports| {
                ports.add_input(label, false);
            })
        });
    }
    {
        let slot = active.clone();
        engine.register_fn(
            "add_input",
            move |reg: PortRegistrar, label: &str, optional: bool| {
                modify_ports(&slot, &reg, |ports| {
                    ports.add_input(label, optional);
                })
            },
        );
    }
    {
        let slot = active.clone();
        engine.register_fn("add_output", move |reg: PortRegistrar, label: &str| {
            modify_ports(&slot, &reg, |ports| {
                ports.add_output(label);
            })
        });
    }
    {
        let slot = active.clone();
        engine.register_fn("add_slot", move |reg: PortRegistrar, label: &str| {
            modify_ports(&slot, &reg, |ports| {
                ports.add_slot(label);
            })
        });
    }
    {
        let slot = active.clone();
        engine.register_fn("add_event", move |reg: PortRegistrar, label: &str| {
            modify_ports(&slot, &reg, |ports| {
                ports.add_event(label);
            })
        });
    }
    {
        let slot = active.clone();
        engine.register_fn("remove_port", move |reg: PortRegistrar, label: &str| {
            modify_ports(&slot, &reg, |ports| ports.remove_by_label(label))
        });
    }

    // ===== Output capture =====

    {
        let slot = active.clone();
        engine.on_print(move |text| buffer_output(&slot, text.to_string()));
    }
    {
        let slot = active.clone();
        engine.on_debug(move |text, source, pos: Position| {
            let line = match (source, pos.line()) {
                (Some(source), Some(line)) => format!("[debug] {}:{}: {}", source, line, text),
                (None, Some(line)) => format!("[debug] line {}: {}", line, text),
                _ => format!("[debug] {}", text),
            };
            buffer_output(&slot, line);
        });
    }

    // Functions called from other script functions cannot see the session
    // scope, so the handle sequences are also resolved here for unbound access.
    #[allow(deprecated)]
    engine.on_var(move |name, index, _ctx| {
        if index != 0 {
            return Ok(None);
        }
        let kind = match name {
            "inputs" => PortKind::Input,
            "outputs" => PortKind::Output,
            "slots" => PortKind::Slot,
            "events" => PortKind::Event,
            _ => return Ok(None),
        };
        let slot = active.read().unwrap_or_else(PoisonError::into_inner);
        Ok(slot
            .as_ref()
            .map(|binding| Dynamic::from_array(binding.handles.to_array(kind))))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::NodeId;
    use crate::pipeline::port::SharedPorts;
    use rhai::Scope;
    use std::sync::{Arc, RwLock};

    const OWNER: SessionId = SessionId(7);

    fn ports() -> SharedPorts {
        let shared = PortRegistry::shared();
        {
            let mut ports = shared.write().unwrap();
            ports.add_input("in", false);
            ports.add_parameter_input("gain");
            ports.add_output("out");
            ports.add_parameter_output("gain_out");
            ports.add_slot("reset");
            ports.add_event("done");
        }
        shared
    }

    /// Engine with the host API bound to a fixed session, outside the global interpreter.
    fn bound_engine(ports: &SharedPorts) -> (Engine, ActiveSlot) {
        let handles = HandleTable::marshal(OWNER, &ports.read().unwrap());
        let active: ActiveSlot = Arc::new(RwLock::new(Some(ActiveBinding {
            session: OWNER,
            node: NodeId(1),
            ports: ports.clone(),
            handles: Arc::new(handles),
            default_frame: "/".to_string(),
            echo_output: false,
            output: Vec::new(),
        })));
        let mut engine = Engine::new();
        register_host_api(&mut engine, active.clone());
        (engine, active)
    }

    #[test]
    fn test_marshal_skips_parameter_ports() {
        let ports = ports();
        let table = HandleTable::marshal(OWNER, &ports.read().unwrap());

        assert_eq!(table.inputs.len(), 1);
        assert_eq!(table.outputs.len(), 1);
        assert_eq!(table.slots.len(), 1);
        assert_eq!(table.events.len(), 1);
        assert_eq!(table.inputs[0].label(), "in");
        assert!(table.find(PortKind::Input, "gain").is_none());
        assert_eq!(table.to_array(PortKind::Output).len(), 1);
    }

    #[test]
    fn test_resolve_rejects_stale_handles() {
        let ports = ports();
        let table = HandleTable::marshal(OWNER, &ports.read().unwrap());
        let handle = table.inputs[0].clone();

        assert!(handle.resolve(OWNER, &ports.read().unwrap()).is_ok());
        assert!(matches!(
            handle.resolve(SessionId(8), &ports.read().unwrap()),
            Err(ScriptError::StaleHandle { .. })
        ));

        ports.write().unwrap().add_input("extra", false);
        assert!(matches!(
            handle.resolve(OWNER, &ports.read().unwrap()),
            Err(ScriptError::StaleHandle { .. })
        ));
    }

    #[test]
    fn test_resolve_rejects_removed_port() {
        let ports = ports();
        let mut table = HandleTable::marshal(OWNER, &ports.read().unwrap());
        let mut handle = table.inputs.remove(0);

        ports.write().unwrap().remove(handle.port());
        // Even with a matching generation the port itself is gone
        handle.generation = ports.read().unwrap().generation();
        let err = handle.resolve(OWNER, &ports.read().unwrap()).unwrap_err();
        assert!(err.to_string().contains("no longer exists"));
    }

    #[test]
    fn test_value_conversion() {
        let list = Value::List(vec![Value::Int(1), Value::Text("a".into())]);
        assert_eq!(dynamic_to_value(value_to_dynamic(&list)), Some(list));
        assert_eq!(dynamic_to_value(Dynamic::from(2.5_f64)), Some(Value::Float(2.5)));
        assert_eq!(dynamic_to_value(Dynamic::UNIT), None);
    }

    #[test]
    fn test_read_and_write_through_handles() {
        let ports = ports();
        ports
            .write()
            .unwrap()
            .deliver_to("in", Message::Token(Token::with_frame(21i64, "/map")));
        let (engine, _active) = bound_engine(&ports);

        let mut scope = Scope::new();
        engine
            .run_with_scope(
                &mut scope,
                r#"
                let h = input("in");
                write(output("out"), read_int(h) * 2, frame(h));
                "#,
            )
            .unwrap();

        let published = ports.read().unwrap().published("out").cloned();
        assert_eq!(
            published,
            Some(Message::Token(Token::with_frame(42i64, "/map")))
        );
    }

    #[test]
    fn test_write_uses_default_frame() {
        let ports = ports();
        let (engine, _active) = bound_engine(&ports);

        engine.run(r#"write(outputs[0], "x")"#).unwrap();

        let published = ports.read().unwrap().published("out").cloned();
        assert_eq!(published, Some(Message::Token(Token::new("x"))));
    }

    #[test]
    fn test_typed_read_mismatch_is_script_error() {
        let ports = ports();
        ports.write().unwrap().deliver_to("in", Message::value("text"));
        let (engine, _active) = bound_engine(&ports);

        let err = engine.run("read_int(inputs[0])").unwrap_err();
        assert!(err.to_string().contains("expected int"));
        assert_eq!(engine.eval::<String>("read_string(inputs[0])").unwrap(), "text");
    }

    #[test]
    fn test_read_without_message_is_unit() {
        let ports = ports();
        let (engine, _active) = bound_engine(&ports);

        assert!(engine.eval::<Dynamic>("read(inputs[0])").unwrap().is_unit());
        assert!(!engine.eval::<bool>("has_message(inputs[0])").unwrap());
    }

    #[test]
    fn test_wrong_handle_kind() {
        let ports = ports();
        let (engine, _active) = bound_engine(&ports);

        let err = engine.run("write(inputs[0], 1)").unwrap_err();
        assert!(err.to_string().contains("kind 'output'"));
    }

    #[test]
    fn test_stale_handle_is_script_error() {
        let ports = ports();
        let (engine, _active) = bound_engine(&ports);
        ports.write().unwrap().add_output("late");

        let err = engine.run("write(outputs[0], 1)").unwrap_err();
        assert!(err.to_string().contains("Stale handle"));
        assert!(ports.read().unwrap().published("out").is_none());
    }

    #[test]
    fn test_trigger_event() {
        let ports = ports();
        let (engine, _active) = bound_engine(&ports);

        engine.run("trigger(events[0]); trigger(event(\"done\"));").unwrap();
        assert_eq!(ports.read().unwrap().signal_count(PortKind::Event, "done"), 2);
    }

    #[test]
    fn test_handle_introspection() {
        let ports = ports();
        let (engine, _active) = bound_engine(&ports);

        assert_eq!(engine.eval::<String>("inputs[0].label").unwrap(), "in");
        assert_eq!(engine.eval::<String>("kind(slots[0])").unwrap(), "slot");
        assert_eq!(engine.eval::<String>("`${outputs[0]}`").unwrap(), "output 'out'");
        assert!(engine.run("input(\"missing\")").is_err());
    }

    #[test]
    fn test_handles_visible_inside_functions() {
        let ports = ports();
        let (engine, _active) = bound_engine(&ports);

        let count = engine
            .eval::<i64>("fn count() { inputs.len() + outputs.len() } count()")
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_registrar_changes_ports() {
        let ports = ports();
        let (engine, _active) = bound_engine(&ports);
        let mut scope = Scope::new();
        scope.push("reg", PortRegistrar::new(OWNER));

        engine
            .run_with_scope(
                &mut scope,
                r#"
                add_input(reg, "a");
                add_input(reg, "b", true);
                add_output(reg, "c");
                remove_port(reg, "done");
                "#,
            )
            .unwrap();

        let ports = ports.read().unwrap();
        assert_eq!(ports.ports(PortKind::Input).count(), 4);
        assert!(ports.find(PortKind::Input, "b").unwrap().optional);
        assert!(ports.find(PortKind::Output, "c").is_some());
        assert!(ports.find(PortKind::Event, "done").is_none());
    }

    #[test]
    fn test_foreign_registrar_rejected() {
        let ports = ports();
        let (engine, _active) = bound_engine(&ports);
        let mut scope = Scope::new();
        scope.push("reg", PortRegistrar::new(SessionId(99)));

        assert!(engine
            .run_with_scope(&mut scope, r#"add_input(reg, "a")"#)
            .is_err());
    }

    #[test]
    fn test_print_is_buffered() {
        let ports = ports();
        let (engine, active) = bound_engine(&ports);

        engine.run(r#"print("hello"); debug("dbg");"#).unwrap();

        let slot = active.read().unwrap();
        let output = &slot.as_ref().unwrap().output;
        assert_eq!(output[0], "hello");
        assert!(output[1].starts_with("[debug]"));
    }
}
