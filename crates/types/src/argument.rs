//! Call arguments and the integer precision rule.
//!
//! Numerals are classified once, at ingestion. A numeral is a machine
//! integer only when it fits `i64` exactly, stays inside the range a double
//! can represent without loss (±(2^53−1)), and has at most 15 decimal
//! digits. Anything else keeps its original decimal text.

use indexmap::IndexMap;
use serde::Serialize;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde_json::{Map, Number, Value};

/// Largest integer magnitude a double represents exactly.
pub const MAX_SAFE_INTEGER: i64 = (1_i64 << 53) - 1;

/// Maximum decimal digits accepted for a machine integer.
pub const MAX_INTEGER_DIGITS: usize = 15;

/// Field name the provider's deserializer reads to pick a concrete type.
pub const CLASS_FIELD: &str = "class";

/// One argument of a generic call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArgument {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Integer (or non-finite numeral) kept as its exact decimal text.
    OversizedInteger(String),
    Array(Vec<CallArgument>),
    Object {
        type_hint: Option<String>,
        fields: IndexMap<String, CallArgument>,
    },
}

/// Result of classifying numeral text under the precision rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Numeral {
    Int(i64),
    Float(f64),
    Verbatim(String),
}

/// Classify a numeral's text.
///
/// Integral numerals that violate the precision rule, and fractional
/// numerals that do not fit a finite double, come back verbatim.
pub fn classify_numeral(text: &str) -> Numeral {
    let text = text.trim();
    let integral = !text.contains(['.', 'e', 'E']);
    if integral {
        let digits = text.trim_start_matches(['-', '+']).len();
        return match text.parse::<i64>() {
            Ok(value) if digits <= MAX_INTEGER_DIGITS && (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&value) => {
                Numeral::Int(value)
            }
            _ => Numeral::Verbatim(text.to_string()),
        };
    }
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Numeral::Float(value),
        _ => Numeral::Verbatim(text.to_string()),
    }
}

/// Whether a numeral survives the trip through a double unchanged.
pub fn is_safe_integer_text(text: &str) -> bool {
    matches!(classify_numeral(text), Numeral::Int(_))
}

impl CallArgument {
    pub fn object(type_hint: Option<String>) -> Self {
        Self::Object {
            type_hint,
            fields: IndexMap::new(),
        }
    }

    /// Builds an argument from a decoded JSON value, applying the precision
    /// rule recursively. A string `class` field on an object becomes its type
    /// hint.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(flag),
            Value::Number(number) => Self::from_numeral(&number.to_string()),
            Value::String(text) => Self::Str(text),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from_json).collect()),
            Value::Object(map) => {
                let mut type_hint = None;
                let mut fields = IndexMap::with_capacity(map.len());
                for (key, value) in map {
                    match value {
                        Value::String(hint) if key == CLASS_FIELD && type_hint.is_none() => type_hint = Some(hint),
                        other => {
                            fields.insert(key, Self::from_json(other));
                        }
                    }
                }
                Self::Object { type_hint, fields }
            }
        }
    }

    pub fn from_numeral(text: &str) -> Self {
        match classify_numeral(text) {
            Numeral::Int(value) => Self::Int(value),
            Numeral::Float(value) => Self::Float(value),
            Numeral::Verbatim(text) => Self::OversizedInteger(text),
        }
    }

    /// JSON form handed to collaborators; oversized integers become strings.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Int(value) => Value::Number(Number::from(*value)),
            Self::Float(value) => Number::from_f64(*value).map(Value::Number).unwrap_or(Value::Null),
            Self::Str(text) | Self::OversizedInteger(text) => Value::String(text.clone()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object { type_hint, fields } => {
                let mut map = Map::with_capacity(fields.len() + 1);
                if let Some(hint) = type_hint {
                    map.insert(CLASS_FIELD.to_string(), Value::String(hint.clone()));
                }
                for (key, value) in fields {
                    map.insert(key.clone(), value.to_json());
                }
                Value::Object(map)
            }
        }
    }
}

impl Serialize for CallArgument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(flag) => serializer.serialize_bool(*flag),
            Self::Int(value) => serializer.serialize_i64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            Self::Str(text) | Self::OversizedInteger(text) => serializer.serialize_str(text),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object { type_hint, fields } => {
                let mut map = serializer.serialize_map(Some(fields.len() + usize::from(type_hint.is_some())))?;
                if let Some(hint) = type_hint {
                    map.serialize_entry(CLASS_FIELD, hint)?;
                }
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

/// Rewrites every integer in `value` that violates the precision rule as a
/// decimal string. Relies on `serde_json` keeping the original numeral text.
pub fn preserve_precision(value: Value) -> Value {
    match value {
        Value::Number(number) => {
            let text = number.to_string();
            let integral = !text.contains(['.', 'e', 'E']);
            if integral && !is_safe_integer_text(&text) {
                Value::String(text)
            } else {
                Value::Number(number)
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(preserve_precision).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(key, value)| (key, preserve_precision(value))).collect()),
        other => other,
    }
}
