//! Structured request/response value tree

use serde::{Deserialize, Serialize};

/// A tree of typed scalars, lists and named maps.
///
/// Requests, prepared results and final results all travel as `ModelValue`.
/// Objects keep their keys in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum ModelValue {
    /// No value
    #[default]
    Undefined,
    /// Boolean scalar
    Boolean(bool),
    /// 32-bit integer scalar
    Int(i32),
    /// 64-bit integer scalar
    Long(i64),
    /// Floating point scalar
    Double(f64),
    /// String scalar
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Ordered list of values
    List(Vec<ModelValue>),
    /// Named map, insertion ordered
    Object(Vec<(String, ModelValue)>),
}

impl ModelValue {
    /// An empty object
    pub fn object() -> Self {
        Self::Object(Vec::new())
    }

    /// The shape a failed outcome takes when a result value is required:
    /// `{"outcome": "failed", "failure-description": message}`.
    pub fn failed(message: &str) -> Self {
        Self::object()
            .with("outcome", "failed")
            .with("failure-description", message)
    }

    /// Returns `self` with `key` set to `value`.
    ///
    /// Replaces an existing key in place. A non-object value is turned into an object first.
    pub fn with(mut self, key: &str, value: impl Into<ModelValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Set `key` to `value`, converting `self` into an object if needed.
    pub fn set(&mut self, key: &str, value: impl Into<ModelValue>) {
        let value = value.into();
        if !matches!(self, Self::Object(_)) {
            *self = Self::object();
        }
        if let Self::Object(entries) = self {
            match entries.iter_mut().find(|(k, _)| k == key) {
                Some((_, existing)) => *existing = value,
                None => entries.push((key.to_owned(), value)),
            }
        }
    }

    /// Look up a key of an object value
    pub fn get(&self, key: &str) -> Option<&ModelValue> {
        match self {
            Self::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Borrow a string scalar
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Read an integer scalar of either width
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Items, for lists
    pub fn as_list(&self) -> Option<&[ModelValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// `false` only for [`ModelValue::Undefined`]
    pub fn is_defined(&self) -> bool {
        !matches!(self, Self::Undefined)
    }

    /// Whether every `Double` in the tree is finite; NaN and infinities have no wire form
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Double(v) => v.is_finite(),
            Self::List(items) => items.iter().all(ModelValue::is_finite),
            Self::Object(fields) => fields.iter().all(|(_, value)| value.is_finite()),
            _ => true,
        }
    }
}

impl From<bool> for ModelValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i32> for ModelValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for ModelValue {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f64> for ModelValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for ModelValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for ModelValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<ModelValue>> for ModelValue {
    fn from(v: Vec<ModelValue>) -> Self {
        Self::List(v)
    }
}
