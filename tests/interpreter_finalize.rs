//! Process-wide interpreter shutdown
//!
//! Finalizing is permanent for the process, so this binary holds a single
//! test walking through the whole sequence.

mod common;

use common::builders::{NodeBuilder, PortsBuilder};
use scriptnode::pipeline::{DataflowNode, LifecycleState, NodeId, PortRegistry};
use scriptnode::scripting::{Interpreter, Session};
use scriptnode::ScriptError;

#[test]
fn test_finalize_sequence() {
    let interpreter = Interpreter::global().unwrap();

    let mut node = NodeBuilder::new("fn tick() {}").build();
    node.setup(PortRegistry::shared()).unwrap();
    let mut session = Session::create(NodeId(3), PortsBuilder::new().build()).unwrap();

    // Refused while sessions are alive
    match interpreter.finalize() {
        Err(ScriptError::SessionsAlive(n)) => assert_eq!(n, 2),
        other => panic!("expected SessionsAlive, got {:?}", other),
    }
    assert!(!interpreter.is_finalized());

    // A refused finalize leaves the interpreter usable
    node.tick();
    assert!(node.is_ready());
    assert!(node.last_error().is_none());

    node.teardown();
    session.destroy().unwrap();
    session.destroy().unwrap();
    assert_eq!(interpreter.live_sessions(), 0);

    interpreter.finalize().unwrap();
    interpreter.finalize().unwrap();
    assert!(interpreter.is_finalized());

    // Every entry point now reports the interpreter as unavailable
    let err = Interpreter::global().unwrap_err();
    assert!(matches!(err, ScriptError::InterpreterUnavailable(_)));

    let err = Session::create(NodeId(4), PortRegistry::shared()).unwrap_err();
    assert!(err.is_fatal());

    let mut late = NodeBuilder::new("fn tick() {}").id(5).build();
    assert!(late.setup(PortRegistry::shared()).unwrap_err().is_fatal());
    assert_eq!(late.state(), LifecycleState::Failed);
    assert!(late.last_error().is_some());
}
