//! Error handling for script nodes
//!
//! Interpreter failures never unwind into the host. They are captured as a
//! [`Diagnostic`] at the loader/dispatcher boundary and carried inside a
//! [`ScriptError`] so the node can report them through ordinary logging.

use crate::pipeline::id::NodeId;
use chrono::{DateTime, Utc};
use rhai::{EvalAltResult, ParseError, Position};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A captured interpreter failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Human-readable message of the innermost failure.
    pub message: String,
    /// Error class, e.g. `ArithmeticError` or `SyntaxError`.
    pub kind: String,
    /// Line of the failing expression, when the interpreter reported one.
    pub line: Option<usize>,
    /// Column of the failing expression.
    pub column: Option<usize>,
    /// Script call frames from outermost to innermost.
    pub call_stack: Vec<String>,
    /// Script output flushed while the failing call ran.
    pub output: Vec<String>,
    /// Node whose script raised.
    pub node: Option<NodeId>,
    pub captured_at: DateTime<Utc>,
}

impl Diagnostic {
    /// Create a diagnostic from a bare message.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: kind.into(),
            line: None,
            column: None,
            call_stack: Vec::new(),
            output: Vec::new(),
            node: None,
            captured_at: Utc::now(),
        }
    }

    /// Capture a runtime failure, unrolling nested function-call frames.
    ///
    /// When the failing expression carries no position, the call site of the
    /// innermost frame that has one is reported instead.
    pub fn from_eval(err: &EvalAltResult) -> Self {
        let mut call_stack = Vec::new();
        let mut frame_pos = Position::NONE;
        let mut innermost = err;
        while let EvalAltResult::ErrorInFunctionCall(name, _, inner, pos) = innermost {
            call_stack.push(describe_frame(name, *pos));
            if !pos.is_none() {
                frame_pos = *pos;
            }
            innermost = inner.as_ref();
        }

        let mut diagnostic = Self::new(eval_kind(innermost), innermost.to_string());
        diagnostic.call_stack = call_stack;
        let pos = innermost.position();
        diagnostic.set_position(if pos.is_none() { frame_pos } else { pos });
        diagnostic
    }

    /// Capture a failure raised while the host called `hook` directly.
    ///
    /// The host call has no script frame of its own, so `hook()` is recorded
    /// as the outermost one.
    pub fn from_hook(hook: &str, err: &EvalAltResult) -> Self {
        let mut diagnostic = Self::from_eval(err);
        diagnostic.call_stack.insert(0, format!("{}()", hook));
        diagnostic
    }

    /// Capture a compile failure.
    pub fn from_parse(err: &ParseError) -> Self {
        let mut diagnostic = Self::new("SyntaxError", err.to_string());
        diagnostic.set_position(err.1);
        diagnostic
    }

    /// Attach the node that raised.
    pub fn for_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    /// Attach script output flushed during the failing call.
    pub fn with_output(mut self, output: Vec<String>) -> Self {
        self.output = output;
        self
    }

    /// Multi-line report including the call frames, suitable for a log panel.
    pub fn report(&self) -> String {
        let mut report = self.to_string();
        for frame in &self.call_stack {
            report.push_str("\n  in ");
            report.push_str(frame);
        }
        report
    }

    fn set_position(&mut self, pos: Position) {
        self.line = pos.line();
        self.column = pos.position();
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

fn describe_frame(name: &str, pos: Position) -> String {
    match pos.line() {
        Some(line) => format!("{}() at line {}", name, line),
        None => format!("{}()", name),
    }
}

fn eval_kind(err: &EvalAltResult) -> &'static str {
    match err {
        EvalAltResult::ErrorArithmetic(..) => "ArithmeticError",
        EvalAltResult::ErrorRuntime(..) => "RuntimeError",
        EvalAltResult::ErrorFunctionNotFound(..) => "FunctionNotFound",
        EvalAltResult::ErrorVariableNotFound(..) => "VariableNotFound",
        EvalAltResult::ErrorPropertyNotFound(..) => "PropertyNotFound",
        EvalAltResult::ErrorMismatchDataType(..) | EvalAltResult::ErrorMismatchOutputType(..) => {
            "TypeError"
        }
        EvalAltResult::ErrorArrayBounds(..)
        | EvalAltResult::ErrorStringBounds(..)
        | EvalAltResult::ErrorIndexNotFound(..) => "IndexError",
        EvalAltResult::ErrorParsing(..) => "SyntaxError",
        EvalAltResult::ErrorStackOverflow(..) => "StackOverflow",
        _ => "ScriptError",
    }
}

/// Main error type for script node operations
#[derive(Error, Debug)]
pub enum ScriptError {
    /// Process-wide interpreter could not be started, or was finalized.
    /// Fatal to the node.
    #[error("Interpreter unavailable: {0}")]
    InterpreterUnavailable(String),

    /// Script text failed to compile or raised while executing its body.
    #[error("Load failure: {0}")]
    LoadFailure(Diagnostic),

    /// A lifecycle hook raised during invocation.
    #[error("Callback '{hook}' failed: {diagnostic}")]
    CallbackFailure { hook: String, diagnostic: Diagnostic },

    /// A handle refers to a port that changed or disappeared after it was marshaled.
    #[error("Stale handle for port '{port}': {reason}")]
    StaleHandle { port: String, reason: String },

    /// Process-wide teardown attempted while sessions still exist.
    #[error("Cannot finalize interpreter: {0} session(s) still alive")]
    SessionsAlive(usize),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ScriptError>,
    },
}

impl ScriptError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ScriptError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The captured interpreter diagnostic, if this error carries one.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            ScriptError::LoadFailure(d) => Some(d),
            ScriptError::CallbackFailure { diagnostic, .. } => Some(diagnostic),
            ScriptError::WithContext { source, .. } => source.diagnostic(),
            _ => None,
        }
    }

    /// Whether the node can no longer be used.
    pub fn is_fatal(&self) -> bool {
        match self {
            ScriptError::InterpreterUnavailable(_) => true,
            ScriptError::WithContext { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

/// Result type alias for script node operations
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
