//! Attribute values and attribute sets.
//!
//! An [`AttributeSet`] is the unit the whole engine works on: desired
//! configuration, stored state and remote read results are all attribute sets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::schema::{ResourceSchema, ValueType};

/// Placeholder rendered instead of sensitive values.
pub const REDACTED: &str = "(sensitive)";

/// A single typed attribute value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// String value.
    String(String),
    /// Explicitly unset.
    Null,
}

/// Ordered mapping from attribute name to value.
///
/// Backed by a `BTreeMap`, so two sets compare by key and never by the order
/// in which attributes were declared.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet {
    values: BTreeMap<String, AttributeValue>,
}

impl AttributeValue {
    /// Creates a string value.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Returns true for `Null` and for blank strings.
    ///
    /// Unset values never produce command clauses and never count as a
    /// request to remove an optional attribute.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.trim().is_empty(),
            Self::Bool(_) | Self::Integer(_) => false,
        }
    }

    /// Returns the value type, or `None` for `Null`.
    #[must_use]
    pub const fn value_type(&self) -> Option<ValueType> {
        match self {
            Self::Bool(_) => Some(ValueType::Bool),
            Self::Integer(_) => Some(ValueType::Integer),
            Self::String(_) => Some(ValueType::String),
            Self::Null => None,
        }
    }

    /// Returns a short type name for diagnostics.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::String(_) => "string",
            Self::Null => "null",
        }
    }

    /// Returns the string slice for string values.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts a JSON scalar into an attribute value.
    ///
    /// Floats and nested structures are rendered as strings.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::String(n.to_string()), Self::Integer),
            serde_json::Value::String(s) => Self::String(s.clone()),
            other => Self::String(other.to_string()),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
        }
    }
}

// Values may be sensitive, so Debug only shows the type.
impl fmt::Debug for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.kind_name())
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl AttributeSet {
    /// Creates an empty attribute set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Adds an attribute, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts or replaces an attribute.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Removes an attribute.
    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        self.values.remove(name)
    }

    /// Gets an attribute value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name)
    }

    /// Gets an attribute only if it holds a set (non-blank) value.
    #[must_use]
    pub fn get_set(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name).filter(|v| !v.is_unset())
    }

    /// Returns true if the attribute is present and set.
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.get_set(name).is_some()
    }

    /// Iterates attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates attribute names in key order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the set has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns a copy without unset values.
    #[must_use]
    pub fn without_unset(&self) -> Self {
        self.values
            .iter()
            .filter(|(_, v)| !v.is_unset())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Returns a copy where every set value of `other` replaces ours.
    #[must_use]
    pub fn overlay(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (name, value) in other.iter() {
            if !value.is_unset() {
                merged.insert(name, value.clone());
            }
        }
        merged
    }

    /// Returns a display adapter that masks the schema's sensitive values.
    #[must_use]
    pub const fn redacted<'a>(&'a self, schema: &'a ResourceSchema) -> Redacted<'a> {
        Redacted { set: self, schema }
    }
}

impl FromIterator<(String, AttributeValue)> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = (String, AttributeValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl fmt::Debug for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

/// Display adapter produced by [`AttributeSet::redacted`].
#[derive(Debug)]
pub struct Redacted<'a> {
    set: &'a AttributeSet,
    schema: &'a ResourceSchema,
}

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.set.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if self.schema.is_sensitive(name) {
                write!(f, "{name} = {REDACTED}")?;
            } else {
                write!(f, "{name} = {value}")?;
            }
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::schema::AttributeSpec;

    #[test]
    fn test_unset_values() {
        assert!(AttributeValue::Null.is_unset());
        assert!(AttributeValue::string("").is_unset());
        assert!(AttributeValue::string("   ").is_unset());
        assert!(!AttributeValue::string("x").is_unset());
        assert!(!AttributeValue::Integer(0).is_unset());
        assert!(!AttributeValue::Bool(false).is_unset());
    }

    #[test]
    fn test_sets_compare_by_key() {
        let a = AttributeSet::new().with("b", "2").with("a", "1");
        let b = AttributeSet::new().with("a", "1").with("b", "2");
        assert_eq!(a, b);
        assert_eq!(a.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_overlay_ignores_unset() {
        let stored = AttributeSet::new().with("a", "1").with("b", "2");
        let desired = AttributeSet::new().with("a", "9").with("b", "");
        let merged = stored.overlay(&desired);
        assert_eq!(merged.get("a"), Some(&AttributeValue::string("9")));
        assert_eq!(merged.get("b"), Some(&AttributeValue::string("2")));
    }

    #[test]
    fn test_untagged_serde() {
        let set: AttributeSet =
            serde_json::from_str(r#"{"name":"cg1","timeout":30,"enabled":true,"gone":null}"#)
                .expect("valid json");
        assert_eq!(set.get("name"), Some(&AttributeValue::string("cg1")));
        assert_eq!(set.get("timeout"), Some(&AttributeValue::Integer(30)));
        assert_eq!(set.get("enabled"), Some(&AttributeValue::Bool(true)));
        assert_eq!(set.get("gone"), Some(&AttributeValue::Null));
        assert_eq!(set.without_unset().len(), 3);
    }

    #[test]
    fn test_debug_hides_values() {
        let set = AttributeSet::new().with("password", "hunter2");
        let rendered = format!("{set:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("password"));
    }

    #[test]
    fn test_redacted_display() {
        let schema = ResourceSchema::new("login")
            .with_attribute("user", AttributeSpec::required(ValueType::String))
            .with_attribute("password", AttributeSpec::required(ValueType::String).sensitive());
        let set = AttributeSet::new().with("user", "dbc").with("password", "hunter2");
        let rendered = set.redacted(&schema).to_string();
        assert!(rendered.contains("user = dbc"));
        assert!(rendered.contains("password = (sensitive)"));
        assert!(!rendered.contains("hunter2"));
    }
}
