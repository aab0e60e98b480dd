//! Host-side port model.
//!
//! A node's ports live in a [`PortRegistry`] owned by the host graph and
//! shared with the node. Every change in the number of ports bumps the
//! registry generation; script handles remember the generation they were
//! built against and are refused once it moves on.

use crate::pipeline::id::PortId;
use crate::pipeline::message::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};

/// What a port does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    /// Receives messages.
    Input,
    /// Publishes messages.
    Output,
    /// Receives signals from events of other nodes.
    Slot,
    /// Emits signals.
    Event,
}

impl PortKind {
    pub fn name(&self) -> &'static str {
        match self {
            PortKind::Input => "input",
            PortKind::Output => "output",
            PortKind::Slot => "slot",
            PortKind::Event => "event",
        }
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single port and its current traffic.
#[derive(Debug, Clone)]
pub struct Port {
    pub id: PortId,
    pub label: String,
    pub kind: PortKind,
    /// Parameter ports mirror node parameters and are not handed to scripts.
    pub parameter: bool,
    /// Optional inputs do not block processing when empty.
    pub optional: bool,
    /// Message currently held by an input.
    pub current: Option<Message>,
    /// Last message published on an output.
    pub published: Option<Message>,
    /// Number of times an event was triggered or a slot was signalled.
    pub signal_count: u64,
}

impl Port {
    fn new(id: PortId, label: &str, kind: PortKind) -> Self {
        Self {
            id,
            label: label.to_string(),
            kind,
            parameter: false,
            optional: false,
            current: None,
            published: None,
            signal_count: 0,
        }
    }
}

/// Ordered collection of a node's ports.
#[derive(Debug, Default)]
pub struct PortRegistry {
    ports: Vec<Port>,
    next_id: u32,
    generation: u64,
}

/// Registry shared between the host graph and the node.
pub type SharedPorts = Arc<RwLock<PortRegistry>>;

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry wrapped for sharing.
    pub fn shared() -> SharedPorts {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Incremented on every add or remove.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    fn add(&mut self, label: &str, kind: PortKind, parameter: bool, optional: bool) -> PortId {
        let id = PortId(self.next_id);
        self.next_id += 1;
        let mut port = Port::new(id, label, kind);
        port.parameter = parameter;
        port.optional = optional;
        self.ports.push(port);
        self.generation += 1;
        id
    }

    pub fn add_input(&mut self, label: &str, optional: bool) -> PortId {
        self.add(label, PortKind::Input, false, optional)
    }

    pub fn add_parameter_input(&mut self, label: &str) -> PortId {
        self.add(label, PortKind::Input, true, true)
    }

    pub fn add_output(&mut self, label: &str) -> PortId {
        self.add(label, PortKind::Output, false, false)
    }

    pub fn add_parameter_output(&mut self, label: &str) -> PortId {
        self.add(label, PortKind::Output, true, false)
    }

    pub fn add_slot(&mut self, label: &str) -> PortId {
        self.add(label, PortKind::Slot, false, false)
    }

    pub fn add_event(&mut self, label: &str) -> PortId {
        self.add(label, PortKind::Event, false, false)
    }

    /// Remove a port. Returns `false` if no such port exists.
    pub fn remove(&mut self, id: PortId) -> bool {
        let before = self.ports.len();
        self.ports.retain(|p| p.id != id);
        let removed = self.ports.len() != before;
        if removed {
            self.generation += 1;
        }
        removed
    }

    /// Remove the first port with the given label, of any kind.
    pub fn remove_by_label(&mut self, label: &str) -> bool {
        match self.ports.iter().find(|p| p.label == label).map(|p| p.id) {
            Some(id) => self.remove(id),
            None => false,
        }
    }

    pub fn get(&self, id: PortId) -> Option<&Port> {
        self.ports.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: PortId) -> Option<&mut Port> {
        self.ports.iter_mut().find(|p| p.id == id)
    }

    /// Look up a port by kind and label.
    pub fn find(&self, kind: PortKind, label: &str) -> Option<&Port> {
        self.ports
            .iter()
            .find(|p| p.kind == kind && p.label == label)
    }

    /// All ports of a kind, in the order they were added.
    pub fn ports(&self, kind: PortKind) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(move |p| p.kind == kind)
    }

    // ── Host traffic ──

    /// Place a message on an input. Returns `false` if `id` is not an input.
    pub fn deliver(&mut self, id: PortId, message: Message) -> bool {
        match self.get_mut(id) {
            Some(port) if port.kind == PortKind::Input => {
                port.current = Some(message);
                true
            }
            _ => false,
        }
    }

    /// Place a message on the input with the given label.
    pub fn deliver_to(&mut self, label: &str, message: Message) -> bool {
        match self.find(PortKind::Input, label).map(|p| p.id) {
            Some(id) => self.deliver(id, message),
            None => false,
        }
    }

    /// Drop every message currently held by inputs.
    pub fn clear_inputs(&mut self) {
        for port in self.ports.iter_mut().filter(|p| p.kind == PortKind::Input) {
            port.current = None;
        }
    }

    /// The last message published on the output with the given label.
    pub fn published(&self, label: &str) -> Option<&Message> {
        self.find(PortKind::Output, label)
            .and_then(|p| p.published.as_ref())
    }

    /// Take the last message published on the output with the given label.
    pub fn take_published(&mut self, label: &str) -> Option<Message> {
        let id = self.find(PortKind::Output, label)?.id;
        self.get_mut(id).and_then(|p| p.published.take())
    }

    /// Number of signals seen by the event or slot with the given label.
    pub fn signal_count(&self, kind: PortKind, label: &str) -> u64 {
        self.find(kind, label).map(|p| p.signal_count).unwrap_or(0)
    }

    /// Signal a slot from the host side.
    pub fn signal_slot(&mut self, label: &str) -> bool {
        match self.find(PortKind::Slot, label).map(|p| p.id) {
            Some(id) => self.signal(id),
            None => false,
        }
    }

    pub(crate) fn publish(&mut self, id: PortId, message: Message) -> bool {
        match self.get_mut(id) {
            Some(port) if port.kind == PortKind::Output => {
                port.published = Some(message);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn signal(&mut self, id: PortId) -> bool {
        match self.get_mut(id) {
            Some(port) if matches!(port.kind, PortKind::Event | PortKind::Slot) => {
                port.signal_count += 1;
                true
            }
            _ => false,
        }
    }
}
