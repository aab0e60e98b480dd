//! Test data builders for creating test objects

use scriptnode::pipeline::{NodeId, PortRegistry, ScriptNode, SharedPorts, SharedSink};
use scriptnode::ScriptNodeSettings;

/// Builder for a port registry with labelled ports
#[derive(Default)]
pub struct PortsBuilder {
    inputs: Vec<(String, bool)>,
    parameter_inputs: Vec<String>,
    outputs: Vec<String>,
    slots: Vec<String>,
    events: Vec<String>,
}

impl PortsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, label: &str) -> Self {
        self.inputs.push((label.to_string(), false));
        self
    }

    pub fn optional_input(mut self, label: &str) -> Self {
        self.inputs.push((label.to_string(), true));
        self
    }

    pub fn parameter_input(mut self, label: &str) -> Self {
        self.parameter_inputs.push(label.to_string());
        self
    }

    pub fn output(mut self, label: &str) -> Self {
        self.outputs.push(label.to_string());
        self
    }

    pub fn slot(mut self, label: &str) -> Self {
        self.slots.push(label.to_string());
        self
    }

    pub fn event(mut self, label: &str) -> Self {
        self.events.push(label.to_string());
        self
    }

    pub fn build(self) -> SharedPorts {
        let ports = PortRegistry::shared();
        {
            let mut p = ports.write().unwrap();
            for (label, optional) in &self.inputs {
                p.add_input(label, *optional);
            }
            for label in &self.parameter_inputs {
                p.add_parameter_input(label);
            }
            for label in &self.outputs {
                p.add_output(label);
            }
            for label in &self.slots {
                p.add_slot(label);
            }
            for label in &self.events {
                p.add_event(label);
            }
        }
        ports
    }
}

/// Builder for script nodes
pub struct NodeBuilder {
    id: NodeId,
    name: String,
    code: String,
    settings: ScriptNodeSettings,
    sink: Option<SharedSink>,
}

impl NodeBuilder {
    pub fn new(code: &str) -> Self {
        Self {
            id: NodeId(100),
            name: "script".to_string(),
            code: code.to_string(),
            settings: ScriptNodeSettings::default(),
            sink: None,
        }
    }

    pub fn id(mut self, id: u32) -> Self {
        self.id = NodeId(id);
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn default_frame(mut self, frame: &str) -> Self {
        self.settings.default_frame = frame.to_string();
        self
    }

    pub fn sink(mut self, sink: SharedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> ScriptNode {
        let node = ScriptNode::with_settings(self.id, self.name, self.settings).with_code(self.code);
        match self.sink {
            Some(sink) => node.with_sink(sink),
            None => node,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptnode::pipeline::PortKind;

    #[test]
    fn test_ports_builder() {
        let ports = PortsBuilder::new()
            .input("a")
            .optional_input("b")
            .output("out")
            .event("done")
            .build();

        let p = ports.read().unwrap();
        assert_eq!(p.ports(PortKind::Input).count(), 2);
        assert!(p.find(PortKind::Input, "b").unwrap().optional);
        assert!(p.find(PortKind::Event, "done").is_some());
    }
}
