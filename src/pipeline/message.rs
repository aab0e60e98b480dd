//! Message envelope exchanged over node ports.
//!
//! A message is either a data token (a value plus a coordinate-frame tag)
//! or a marker token that carries no data and signals a stream condition.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame tag attached to tokens when the publisher does not name one.
pub const DEFAULT_FRAME: &str = "/";

/// Payload of a data token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    List(Vec<Value>),
}

/// The kind of a [`Value`], used for typed reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Int,
    Float,
    Text,
    Bool,
    List,
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Text => "string",
            ValueKind::Bool => "bool",
            ValueKind::List => "list",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
            Value::Bool(_) => ValueKind::Bool,
            Value::List(_) => ValueKind::List,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, with ints widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// A data token: value plus frame tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub value: Value,
    pub frame: String,
}

impl Token {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            frame: DEFAULT_FRAME.to_string(),
        }
    }

    pub fn with_frame(value: impl Into<Value>, frame: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            frame: frame.into(),
        }
    }
}

/// Non-data control tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Marker {
    /// The upstream node produced nothing this round.
    NoMessage,
    /// The current sequence of messages ended.
    EndOfSequence,
    /// The upstream program finished.
    EndOfProgram,
}

impl Marker {
    pub fn all() -> &'static [Marker] {
        &[Marker::NoMessage, Marker::EndOfSequence, Marker::EndOfProgram]
    }
}

/// Anything that can arrive on an input port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Token(Token),
    Marker(Marker),
}

impl Message {
    pub fn value(value: impl Into<Value>) -> Self {
        Message::Token(Token::new(value))
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, Message::Marker(_))
    }

    pub fn marker(&self) -> Option<Marker> {
        match self {
            Message::Marker(m) => Some(*m),
            Message::Token(_) => None,
        }
    }

    pub fn token(&self) -> Option<&Token> {
        match self {
            Message::Token(t) => Some(t),
            Message::Marker(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_default_frame() {
        let token = Token::new(3i64);
        assert_eq!(token.frame, DEFAULT_FRAME);
        assert_eq!(token.value.kind(), ValueKind::Int);
    }

    #[test]
    fn test_value_widening() {
        assert_eq!(Value::Int(2).as_float(), Some(2.0));
        assert_eq!(Value::Float(2.5).as_int(), None);
        assert_eq!(Value::from("ok").as_str(), Some("ok"));
    }

    #[test]
    fn test_message_marker() {
        let msg = Message::Marker(Marker::EndOfSequence);
        assert!(msg.is_marker());
        assert_eq!(msg.marker(), Some(Marker::EndOfSequence));
        assert!(Message::value(true).token().is_some());
    }
}
