//! Field values and the keyed field store holding one version of a document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// A single field value.
///
/// Declared fields hold one of the primitive kinds. `Opaque` carries any
/// other JSON found under an undeclared key so it can be written back as
/// read; it never matches a schema default, so writes cannot target it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    /// Kept as a JSON number so integers are written back as integers.
    Number(Number),
    Bool(bool),
    Opaque(Value),
}

impl FieldValue {
    /// Human-readable name of the value kind, used in codec errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Bool(_) => "boolean",
            Self::Opaque(_) => "opaque",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether `other` is the same kind of value as `self`.
    pub fn same_kind(&self, other: &FieldValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Map a JSON value onto a field value without loss.
    pub fn from_json(json: Value) -> Self {
        match json {
            Value::String(s) => Self::String(s),
            Value::Number(n) => Self::Number(n),
            Value::Bool(b) => Self::Bool(b),
            other => Self::Opaque(other),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Number(n) => Value::Number(n.clone()),
            Self::Bool(b) => Value::Bool(*b),
            Self::Opaque(v) => v.clone(),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Opaque(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for FieldValue {
    /// Non-finite numbers have no JSON form and become `null`.
    fn from(n: f64) -> Self {
        Self::from_json(Value::from(n))
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Declaration of one schema field: its key and default value.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub default: DefaultValue,
}

/// `const`-friendly default for a [`FieldSpec`].
#[derive(Debug, Clone, Copy)]
pub enum DefaultValue {
    String(&'static str),
    Integer(i64),
    Number(f64),
    Bool(bool),
}

impl DefaultValue {
    pub fn to_value(self) -> FieldValue {
        match self {
            Self::String(s) => FieldValue::String(s.to_string()),
            Self::Integer(n) => FieldValue::from(n),
            Self::Number(n) => FieldValue::from(n),
            Self::Bool(b) => FieldValue::Bool(b),
        }
    }
}

/// Keyed bag of field values for one version of a document.
///
/// Keys outside the document's schema are kept and written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldStore {
    values: BTreeMap<String, FieldValue>,
}

impl FieldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store populated with every schema default.
    pub fn with_defaults(schema: &[FieldSpec]) -> Self {
        let mut store = Self::new();
        for spec in schema {
            store.set(spec.name, spec.default.to_value());
        }
        store
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: FieldValue) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.values.remove(key)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.values.iter()
    }

    /// Copy of `self` with any missing schema keys filled from defaults.
    pub fn filled(&self, schema: &[FieldSpec]) -> Self {
        let mut out = self.clone();
        for spec in schema {
            if !out.values.contains_key(spec.name) {
                out.set(spec.name, spec.default.to_value());
            }
        }
        out
    }
}

impl FromIterator<(String, FieldValue)> for FieldStore {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
