//! Per-attribute metadata and resource schemas.

use std::fmt;

/// How an attribute is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// Must be set to create the object.
    Required,
    /// May be omitted; omission never removes a remote value.
    Optional,
    /// Assigned by the server, never supplied by the caller.
    Computed,
}

/// Declared value type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Text.
    String,
    /// Signed integer.
    Integer,
    /// Boolean.
    Bool,
}

/// Metadata for one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSpec {
    /// Supply mode.
    pub kind: AttributeKind,
    /// Declared value type.
    pub value_type: ValueType,
    /// A change requires delete + create instead of an in-place update.
    pub forces_replacement: bool,
    /// The value must never be rendered in diagnostics.
    pub sensitive: bool,
}

impl AttributeSpec {
    /// A required attribute.
    #[must_use]
    pub const fn required(value_type: ValueType) -> Self {
        Self::with_kind(AttributeKind::Required, value_type)
    }

    /// An optional attribute.
    #[must_use]
    pub const fn optional(value_type: ValueType) -> Self {
        Self::with_kind(AttributeKind::Optional, value_type)
    }

    /// A server-computed attribute.
    #[must_use]
    pub const fn computed(value_type: ValueType) -> Self {
        Self::with_kind(AttributeKind::Computed, value_type)
    }

    const fn with_kind(kind: AttributeKind, value_type: ValueType) -> Self {
        Self {
            kind,
            value_type,
            forces_replacement: false,
            sensitive: false,
        }
    }

    /// Marks the attribute as forcing replacement on change.
    #[must_use]
    pub const fn forces_replacement(mut self) -> Self {
        self.forces_replacement = true;
        self
    }

    /// Marks the attribute as sensitive.
    #[must_use]
    pub const fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Returns true for required attributes.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        matches!(self.kind, AttributeKind::Required)
    }

    /// Returns true for computed attributes.
    #[must_use]
    pub const fn is_computed(&self) -> bool {
        matches!(self.kind, AttributeKind::Computed)
    }
}

/// Attribute specs of one resource type, in canonical order.
///
/// The canonical order is the order attributes were added. Commands always
/// render clauses in this order, whatever order the configuration used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSchema {
    type_name: String,
    attributes: Vec<(String, AttributeSpec)>,
}

impl ResourceSchema {
    /// Creates an empty schema for a resource type.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            attributes: Vec::new(),
        }
    }

    /// Appends an attribute. Re-adding a name replaces its spec in place.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, spec: AttributeSpec) -> Self {
        let name = name.into();
        if let Some(slot) = self.attributes.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = spec;
        } else {
            self.attributes.push((name, spec));
        }
        self
    }

    /// Resource type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Looks up an attribute spec.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, spec)| spec)
    }

    /// Iterates attributes in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeSpec)> {
        self.attributes.iter().map(|(n, s)| (n.as_str(), s))
    }

    /// Returns true if the attribute is declared sensitive.
    #[must_use]
    pub fn is_sensitive(&self, name: &str) -> bool {
        self.get(name).is_some_and(|s| s.sensitive)
    }

    /// Number of declared attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns true if no attributes are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Bool => "bool",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Required => "required",
            Self::Optional => "optional",
            Self::Computed => "computed",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order_is_insertion_order() {
        let schema = ResourceSchema::new("thing")
            .with_attribute("zeta", AttributeSpec::required(ValueType::String))
            .with_attribute("alpha", AttributeSpec::optional(ValueType::Integer));
        let names: Vec<_> = schema.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_readding_replaces_in_place() {
        let schema = ResourceSchema::new("thing")
            .with_attribute("a", AttributeSpec::optional(ValueType::String))
            .with_attribute("b", AttributeSpec::optional(ValueType::String))
            .with_attribute("a", AttributeSpec::required(ValueType::String).forces_replacement());
        assert_eq!(schema.len(), 2);
        let spec = schema.get("a").expect("declared");
        assert!(spec.is_required());
        assert!(spec.forces_replacement);
        assert_eq!(schema.iter().next().map(|(n, _)| n), Some("a"));
    }
}
