//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use scriptnode::pipeline::{Message, PortKind, SharedPorts, Value};
use std::sync::PoisonError;

/// Value currently published on output `label`, if any.
pub fn published_value(ports: &SharedPorts, label: &str) -> Option<Value> {
    let ports = ports.read().unwrap_or_else(PoisonError::into_inner);
    ports.published(label).and_then(Message::token).map(|t| t.value.clone())
}

/// Frame tag of the message published on output `label`.
pub fn published_frame(ports: &SharedPorts, label: &str) -> Option<String> {
    let ports = ports.read().unwrap_or_else(PoisonError::into_inner);
    ports.published(label).and_then(Message::token).map(|t| t.frame.clone())
}

/// Number of times event `label` was triggered.
pub fn event_count(ports: &SharedPorts, label: &str) -> u64 {
    ports
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .signal_count(PortKind::Event, label)
}

/// Deliver a value to input `label`.
pub fn deliver(ports: &SharedPorts, label: &str, value: impl Into<Value>) {
    let delivered = ports
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .deliver_to(label, Message::value(value));
    assert!(delivered, "no input labelled '{}'", label);
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}
