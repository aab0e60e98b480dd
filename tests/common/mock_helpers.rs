//! Diagnostic capture helpers

use crossbeam_channel::Receiver;
use scriptnode::pipeline::{drain, ChannelSink, SharedSink};
use scriptnode::Diagnostic;
use std::sync::Arc;

/// Create a channel-backed sink and its receiving end.
pub fn capture_sink() -> (SharedSink, Receiver<Diagnostic>) {
    let (sink, rx) = ChannelSink::with_capacity(64);
    (Arc::new(sink), rx)
}

/// Drain the captured diagnostics, asserting exactly one arrived.
pub fn single_diagnostic(rx: &Receiver<Diagnostic>) -> Diagnostic {
    let mut received = drain(rx);
    assert_eq!(received.len(), 1, "expected one diagnostic, got {:?}", received);
    received.remove(0)
}
