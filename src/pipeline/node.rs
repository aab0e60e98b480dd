//! Node abstraction consumed by the host graph.
//!
//! The graph owns the scheduling: it calls `setup` once with the node's
//! port registry, `tick` periodically while `can_tick` holds, and
//! `on_message` whenever the inputs hold a new round of messages.

use crate::error::Result;
use crate::pipeline::message::{Marker, Message};
use crate::pipeline::port::SharedPorts;

/// Lifecycle interface the host graph drives.
pub trait DataflowNode: Send {
    /// Human-readable name of this node.
    fn name(&self) -> &str;

    /// Called once with the registry holding this node's ports.
    ///
    /// An error here means the node cannot be used at all.
    fn setup(&mut self, ports: SharedPorts) -> Result<()>;

    /// Whether the host should call `tick` periodically.
    fn can_tick(&self) -> bool {
        false
    }

    fn tick(&mut self) {}

    /// Whether the node can accept the messages currently on its inputs.
    fn can_process(&self) -> bool;

    /// Called when the inputs hold data messages.
    fn process(&mut self);

    /// Called when a marker token arrives instead of data.
    fn process_marker(&mut self, marker: Marker);

    /// Called after ports were added or removed outside of `setup`.
    fn port_count_changed(&mut self) {}

    /// Route one incoming message round to `process` or `process_marker`.
    fn on_message(&mut self, message: &Message) {
        match message.marker() {
            Some(marker) => self.process_marker(marker),
            None => self.process(),
        }
    }
}
