//! Dynamically typed cell values.
//!
//! Tables are untyped: one column may mix missing values, numbers and strings
//! across rows. Every operator that compares values goes through
//! [`crate::order`], so `Value` itself only carries equality.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::order;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    /// Absence marker; sorts before everything else.
    #[default]
    Missing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
    List(Vec<Value>),
    /// An error captured inline by a mapping operator.
    Error(String),
}

/// Coarse type tag used by `select_is_instance` and the ordering fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Missing,
    Bool,
    Int,
    Float,
    Bytes,
    Text,
    List,
    Error,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Missing => "missing",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Bytes => "bytes",
            ValueKind::Text => "text",
            ValueKind::List => "list",
            ValueKind::Error => "error",
        }
    }
}

/// Numeric view of a value. Bools count as 0/1.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Number {
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Missing => ValueKind::Missing,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Text(_) => ValueKind::Text,
            Value::List(_) => ValueKind::List,
            Value::Error(_) => ValueKind::Error,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn is_numeric(&self) -> bool {
        self.as_number().is_some()
    }

    pub(crate) fn as_number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Int(i64::from(*b))),
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.as_number()? {
            Number::Int(i) => Some(i),
            Number::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(f as i64),
            Number::Float(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.as_number()? {
            Number::Int(i) => Some(i as f64),
            Number::Float(f) => Some(f),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness: missing, `false`, zero and empty containers are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Missing => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Bytes(b) => !b.is_empty(),
            Value::Text(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Error(_) => true,
        }
    }

    /// Identity in the strict sense: same variant and equal payload.
    ///
    /// Unlike `==`, `Int(1)` is not `Bool(true)` and `Int(1)` is not `Float(1.0)`.
    pub fn is_same(&self, other: &Value) -> bool {
        self.kind() == other.kind() && order::equal(self, other)
    }

    /// Containment test backing `select_contains`.
    pub fn contains(&self, needle: &Value) -> bool {
        match (self, needle) {
            (Value::Text(hay), Value::Text(n)) => hay.contains(n.as_str()),
            (Value::Bytes(hay), Value::Bytes(n)) => {
                n.is_empty() || hay.windows(n.len()).any(|w| w == n.as_slice())
            }
            (Value::List(items), n) => items.iter().any(|v| order::equal(v, n)),
            _ => false,
        }
    }

    /// Rough in-memory footprint, used to charge sort buffers against a byte budget.
    pub fn approx_size(&self) -> usize {
        let base = std::mem::size_of::<Value>();
        match self {
            Value::Bytes(b) => base + b.len(),
            Value::Text(s) | Value::Error(s) => base + s.len(),
            Value::List(l) => base + l.iter().map(Value::approx_size).sum::<usize>(),
            _ => base,
        }
    }
}

impl PartialEq for Value {
    /// Native equality: numbers compare across int/float/bool.
    fn eq(&self, other: &Self) -> bool {
        order::equal(self, other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Value::Text(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("(")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str(")")
            }
            Value::Error(e) => write!(f, "#error: {e}"),
        }
    }
}

macro_rules! from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
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

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Missing, Into::into)
    }
}

/// Build a row (`Vec<Value>`) from heterogeneous literals.
///
/// ```
/// use reltab_core::{row, Value};
/// let r = row!["a", 1, 2.5, Value::Missing];
/// assert_eq!(r.len(), 4);
/// ```
#[macro_export]
macro_rules! row {
    () => { ::std::vec::Vec::<$crate::value::Value>::new() };
    ($($v:expr),+ $(,)?) => {
        vec![$($crate::value::Value::from($v)),+]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_equality_crosses_types() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Bool(true), Value::Int(1));
        assert_ne!(Value::Int(1), Value::Text("1".into()));
    }

    #[test]
    fn is_same_is_strict() {
        assert!(Value::Int(3).is_same(&Value::Int(3)));
        assert!(!Value::Int(1).is_same(&Value::Bool(true)));
        assert!(!Value::Int(1).is_same(&Value::Float(1.0)));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Missing.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Text(String::new()).is_truthy());
        assert!(Value::Text("x".into()).is_truthy());
        assert!(Value::List(vec![Value::Missing]).is_truthy());
    }

    #[test]
    fn contains_on_text_bytes_and_lists() {
        assert!(Value::from("foobar").contains(&Value::from("oba")));
        assert!(Value::Bytes(b"abc".to_vec()).contains(&Value::Bytes(b"bc".to_vec())));
        assert!(Value::List(row![1, "a"]).contains(&Value::Float(1.0)));
        assert!(!Value::Int(12).contains(&Value::Int(1)));
    }

    #[test]
    fn row_macro_converts() {
        let r = row!["a", 4, 1.5, true];
        assert_eq!(r[0], Value::Text("a".into()));
        assert_eq!(r[1], Value::Int(4));
        assert_eq!(r[3], Value::Bool(true));
    }
}
