//! The JSTP record format.
//!
//! Records are a relaxed, JavaScript-flavored cousin of JSON: object keys
//! may be bare identifiers, strings are single-quoted by default, trailing
//! commas and comments are tolerated, and `undefined` exists alongside
//! `null`. Every packet on a JSTP wire is a single top-level record.
//!
//! The two surface operations are [`parse`] and [`stringify`]:
//!
//! ```
//! use jstp_common::record::{parse, stringify, Value};
//!
//! let value = parse("{ name: 'console', size: 10 }").unwrap();
//! assert_eq!(value.get("size"), Some(&Value::Int(10)));
//! assert_eq!(stringify(&value), "{name:'console',size:10}");
//! ```
//!
//! Parsing is bounded by a wall-clock deadline (30 ms unless overridden via
//! [`ParseOptions`]) so that pathological input cannot stall a connection.

mod json;
mod parser;
mod serializer;


use std::time::Duration;

use thiserror::Error;

/// A value in the record format.
///
/// Mappings preserve insertion order and keep the last occurrence of a
/// duplicated key. `Undefined` is distinct from `Null`: it marks array
/// holes and is omitted from serialized objects.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Undefined,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
}

impl Value {
    /// Looks up a key in an object value. Returns `None` for non-objects.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(fields) => {
                fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the numeric value of an `Int` or `Float`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&stringify(self))
    }
}

/// What went wrong while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The input does not match the record grammar.
    Syntax,
    /// The wall-clock parse deadline was exceeded.
    Timeout,
}

/// Error produced by [`parse`], with the byte offset of the failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parse error at offset {offset}: {message}")]
pub struct ParseError {
    pub offset: usize,
    pub kind: ParseErrorKind,
    pub message: String,
}

impl ParseError {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        ParseError {
            offset,
            kind: ParseErrorKind::Syntax,
            message: message.into(),
        }
    }

    pub(crate) fn timeout(offset: usize) -> Self {
        ParseError {
            offset,
            kind: ParseErrorKind::Timeout,
            message: "parse deadline exceeded".to_string(),
        }
    }
}

/// Options for [`parse_with`].
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Wall-clock cap on a single parse.
    pub timeout: Duration,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            timeout: Duration::from_millis(30),
        }
    }
}

/// Parses one record with the default options.
pub fn parse(input: &str) -> Result<Value, ParseError> {
    parse_with(input, &ParseOptions::default())
}

/// Parses one record, honoring the caller's [`ParseOptions`].
pub fn parse_with(input: &str, options: &ParseOptions) -> Result<Value, ParseError> {
    parser::Parser::new(input, options.timeout)?.parse_document()
}

/// Serializes a value back into record text.
///
/// The output is minimal: no whitespace, bare keys where the key is a
/// valid identifier, single-quoted strings. `stringify` and [`parse`]
/// round-trip each other for every representable value.
pub fn stringify(value: &Value) -> String {
    let mut out = String::new();
    serializer::write_value(&mut out, value);
    out
}
