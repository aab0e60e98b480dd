//! Diagnostic forwarding from script nodes to the host.
//!
//! Every failure a node captures goes to its [`DiagnosticSink`]. The default
//! [`TracingSink`] writes it to the log; a host UI can instead take a
//! [`ChannelSink`] and drain the receiving end on its own thread.

use crate::error::Diagnostic;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::Arc;

/// Receives diagnostics captured by script nodes.
#[cfg_attr(test, mockall::automock)]
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: &Diagnostic);
}

/// Sink shared between nodes.
pub type SharedSink = Arc<dyn DiagnosticSink>;

/// Logs diagnostics as warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        match diagnostic.node {
            Some(node) => tracing::warn!(node = %node, "{}", diagnostic.report()),
            None => tracing::warn!("{}", diagnostic.report()),
        }
        for line in &diagnostic.output {
            tracing::info!(target: "script", "{}", line);
        }
    }
}

/// Channel capacity for diagnostics (nodes → host UI).
const DIAGNOSTIC_CHANNEL_CAPACITY: usize = 1_024;

/// Forwards diagnostics over a bounded channel.
///
/// Never blocks the reporting node: when the channel is full the diagnostic
/// is logged and dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<Diagnostic>,
}

impl ChannelSink {
    /// Create a sink with the default capacity and its receiving end.
    pub fn new() -> (Self, Receiver<Diagnostic>) {
        Self::with_capacity(DIAGNOSTIC_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, Receiver<Diagnostic>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }
}

impl DiagnosticSink for ChannelSink {
    fn report(&self, diagnostic: &Diagnostic) {
        match self.tx.try_send(diagnostic.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(d)) => {
                tracing::warn!("Diagnostic channel full, dropping: {}", d);
            }
            Err(TrySendError::Disconnected(d)) => {
                tracing::debug!("Diagnostic receiver gone, dropping: {}", d);
            }
        }
    }
}

/// Drain all pending diagnostics without blocking.
pub fn drain(rx: &Receiver<Diagnostic>) -> Vec<Diagnostic> {
    rx.try_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_forwards() {
        let (sink, rx) = ChannelSink::new();
        sink.report(&Diagnostic::new("RuntimeError", "first"));
        sink.report(&Diagnostic::new("RuntimeError", "second"));

        let received = drain(&rx);
        assert_eq!(received.len(), 2);
        assert_eq!(received[1].message, "second");
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_channel_sink_drops_when_full() {
        let (sink, rx) = ChannelSink::with_capacity(1);
        sink.report(&Diagnostic::new("RuntimeError", "kept"));
        sink.report(&Diagnostic::new("RuntimeError", "dropped"));

        let received = drain(&rx);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].message, "kept");
    }

    #[test]
    fn test_channel_sink_survives_disconnect() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.report(&Diagnostic::new("RuntimeError", "nobody listening"));
    }
}
