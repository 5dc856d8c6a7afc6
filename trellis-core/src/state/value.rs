//! Values flowing in and out of reactive nodes.
//!
//! Reads produce a [`Field`]; writes accept anything convertible into an
//! [`Input`]. Composite JSON values never appear in a `Field` directly: an
//! object or array is always surfaced as a [`Reactive`] node so that reads
//! through it keep tracking.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use super::date::ReactiveDate;
use super::node::Reactive;

/// The result of reading a reactive property.
#[derive(Debug, Clone)]
pub enum Field {
    /// The property does not exist.
    Absent,

    /// A primitive: null, boolean, number or string.
    Value(Value),

    /// A nested object or array.
    Node(Reactive),

    /// A date whose mutators notify the owning property.
    Date(ReactiveDate),
}

impl Field {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_value().and_then(Value::as_f64)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_i64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_value().and_then(Value::as_bool)
    }

    pub fn as_node(&self) -> Option<&Reactive> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn into_node(self) -> Option<Reactive> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&ReactiveDate> {
        match self {
            Self::Date(date) => Some(date),
            _ => None,
        }
    }

    /// Scripting-style truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Absent => false,
            Self::Value(value) => is_truthy(value),
            Self::Node(_) | Self::Date(_) => true,
        }
    }

    /// Untracked JSON snapshot, `None` when absent.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::Absent => None,
            Self::Value(value) => Some(value.clone()),
            Self::Node(node) => Some(node.to_json()),
            Self::Date(date) => date.get_untracked().map(date_json),
        }
    }
}

/// Text form used for rendering: strings verbatim, integral numbers without
/// a fraction, null and absent as the empty string.
impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => Ok(()),
            Self::Value(value) => f.write_str(&display_json(value)),
            Self::Node(node) => write!(f, "{}", node.to_json()),
            Self::Date(date) => match date.get_untracked() {
                Some(date) => f.write_str(&format_date(&date)),
                None => Ok(()),
            },
        }
    }
}

impl PartialEq<Value> for Field {
    fn eq(&self, other: &Value) -> bool {
        match self {
            Self::Value(value) => json_eq(value, other),
            _ => false,
        }
    }
}

/// A value being written into a reactive property.
#[derive(Debug, Clone)]
pub enum Input {
    /// Equivalent to removing the property.
    Absent,

    /// Any JSON value; objects and arrays become reactive nodes.
    Value(Value),

    /// An existing node. Nodes of the same root are stored as-is.
    Node(Reactive),

    Date(DateTime<Utc>),
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Reactive> for Input {
    fn from(node: Reactive) -> Self {
        Self::Node(node)
    }
}

impl From<&Reactive> for Input {
    fn from(node: &Reactive) -> Self {
        Self::Node(node.clone())
    }
}

impl From<DateTime<Utc>> for Input {
    fn from(date: DateTime<Utc>) -> Self {
        Self::Date(date)
    }
}

impl From<Field> for Input {
    fn from(field: Field) -> Self {
        match field {
            Field::Absent => Self::Absent,
            Field::Value(value) => Self::Value(value),
            Field::Node(node) => Self::Node(node),
            Field::Date(date) => match date.get_untracked() {
                Some(date) => Self::Date(date),
                None => Self::Absent,
            },
        }
    }
}

impl<T: Into<Input>> From<Option<T>> for Input {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Into::into)
    }
}

macro_rules! input_from_json {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Input {
                fn from(value: $ty) -> Self {
                    Self::Value(Value::from(value))
                }
            }
        )*
    };
}

input_from_json!(bool, i32, i64, u32, u64, usize, f64, String, &str);

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Equality that treats `1` and `1.0` as the same number.
pub(crate) fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

pub(crate) fn display_json(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => display_number(n),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn display_number(n: &serde_json::Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub(crate) fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn date_json(date: DateTime<Utc>) -> Value {
    Value::String(format_date(&date))
}
