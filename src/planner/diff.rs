//! Diff engine for comparing desired vs stored attributes.
//!
//! The diff decides what has to happen to a single managed object: nothing,
//! a create, an in-place update of some attributes, or a full replacement.

use tracing::debug;

use crate::config::AttributeHasher;
use crate::error::{Result, SchemaError};
use crate::resource::{AttributeSet, AttributeValue, ResourceSchema, REDACTED};

/// Engine for computing diffs between desired and stored attributes.
#[derive(Debug, Default)]
pub struct DiffEngine {
    /// Attribute hasher.
    hasher: AttributeHasher,
}

/// What the diff requires for one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    /// Value is the same, or omitted by an optional attribute.
    Unchanged,
    /// Value changes and the remote can alter it in place.
    UpdateInPlace,
    /// Value changes and the object must be recreated.
    Replace,
    /// Server assigns the value when the object is created.
    ComputeOnCreate,
}

/// How the whole object is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Nothing to do.
    NoOp,
    /// The object does not exist yet.
    Create,
    /// Changed attributes are altered on the existing object.
    InPlace,
    /// The object is dropped and created again.
    Replace,
    /// The object is removed.
    Delete,
}

/// Difference for a single attribute.
#[derive(Clone, PartialEq, Eq)]
pub struct AttributeChange {
    /// Attribute name.
    pub name: String,
    /// Stored value (if any).
    pub old_value: Option<AttributeValue>,
    /// Desired value (if any).
    pub new_value: Option<AttributeValue>,
    /// Required action.
    pub action: ChangeAction,
    /// Whether values must be masked when displayed.
    pub sensitive: bool,
}

/// Complete diff for one object.
#[derive(Debug, Clone)]
pub struct Diff {
    changes: Vec<AttributeChange>,
    mode: ExecutionMode,
    desired: AttributeSet,
    stored: AttributeSet,
    target: AttributeSet,
    desired_hash: String,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: AttributeHasher::new(),
        }
    }

    /// Computes the diff between desired and stored attributes.
    ///
    /// An empty `stored` set means the object does not exist yet. Changes are
    /// listed in the schema's canonical order.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] if `desired` misses a required attribute,
    /// names an unknown one, supplies a computed one, or has a value of the
    /// wrong type.
    pub fn compute_diff(
        &self,
        desired: &AttributeSet,
        stored: &AttributeSet,
        schema: &ResourceSchema,
    ) -> Result<Diff> {
        Self::validate(desired, schema)?;

        let desired = desired.without_unset();
        let creating = stored.is_empty();
        let mut changes = Vec::new();

        for (name, spec) in schema.iter() {
            if spec.is_computed() {
                if creating {
                    changes.push(AttributeChange {
                        name: name.to_string(),
                        old_value: None,
                        new_value: None,
                        action: ChangeAction::ComputeOnCreate,
                        sensitive: spec.sensitive,
                    });
                }
                continue;
            }

            let old_value = stored.get_set(name).cloned();
            let new_value = desired.get(name).cloned();

            let action = match (&old_value, &new_value) {
                (None, None) => continue,
                (_, None) => ChangeAction::Unchanged,
                (Some(old), Some(new)) if old == new => ChangeAction::Unchanged,
                _ if spec.forces_replacement => ChangeAction::Replace,
                _ => ChangeAction::UpdateInPlace,
            };

            changes.push(AttributeChange {
                name: name.to_string(),
                old_value,
                new_value,
                action,
                sensitive: spec.sensitive,
            });
        }

        let mode = if creating {
            ExecutionMode::Create
        } else if changes.iter().any(|c| c.action == ChangeAction::Replace) {
            ExecutionMode::Replace
        } else if changes.iter().any(|c| c.action == ChangeAction::UpdateInPlace) {
            ExecutionMode::InPlace
        } else {
            ExecutionMode::NoOp
        };

        let mut target = stored.overlay(&desired);
        for (name, spec) in schema.iter() {
            if spec.is_computed() {
                target.remove(name);
            }
        }

        debug!(
            resource_type = schema.type_name(),
            mode = %mode,
            changed = changes.iter().filter(|c| c.is_change()).count(),
            "Computed diff"
        );

        Ok(Diff {
            changes,
            mode,
            desired_hash: self.hasher.hash_attributes(&desired),
            desired,
            stored: stored.clone(),
            target,
        })
    }

    /// Checks `desired` against the schema.
    fn validate(desired: &AttributeSet, schema: &ResourceSchema) -> Result<()> {
        for (name, value) in desired.iter() {
            let Some(spec) = schema.get(name) else {
                return Err(SchemaError::UnknownAttribute {
                    name: name.to_string(),
                    resource_type: schema.type_name().to_string(),
                }
                .into());
            };

            if value.is_unset() {
                continue;
            }

            if spec.is_computed() {
                return Err(SchemaError::ComputedSupplied {
                    name: name.to_string(),
                }
                .into());
            }

            if value.value_type() != Some(spec.value_type) {
                return Err(SchemaError::TypeMismatch {
                    name: name.to_string(),
                    expected: spec.value_type.to_string(),
                    found: value.kind_name().to_string(),
                }
                .into());
            }
        }

        for (name, spec) in schema.iter() {
            if spec.is_required() && !desired.is_set(name) {
                return Err(SchemaError::MissingRequired {
                    name: name.to_string(),
                }
                .into());
            }
        }

        Ok(())
    }
}

impl Diff {
    /// Builds the diff used to remove an object with the given stored attributes.
    #[must_use]
    pub fn teardown(stored: &AttributeSet) -> Self {
        Self {
            changes: Vec::new(),
            mode: ExecutionMode::Delete,
            desired: AttributeSet::new(),
            stored: stored.clone(),
            target: AttributeSet::new(),
            desired_hash: String::new(),
        }
    }

    /// Per-attribute changes in canonical order.
    #[must_use]
    pub fn changes(&self) -> &[AttributeChange] {
        &self.changes
    }

    /// Iterates the entries that actually change something.
    pub fn changed(&self) -> impl Iterator<Item = &AttributeChange> {
        self.changes.iter().filter(|c| c.is_change())
    }

    /// Execution mode.
    #[must_use]
    pub const fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Returns true if nothing needs to run.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self.mode, ExecutionMode::NoOp)
    }

    /// Desired attributes with unset values dropped.
    #[must_use]
    pub const fn desired(&self) -> &AttributeSet {
        &self.desired
    }

    /// Stored attributes the diff was computed against.
    #[must_use]
    pub const fn stored(&self) -> &AttributeSet {
        &self.stored
    }

    /// Attributes the object should have once the diff is applied.
    ///
    /// This is the stored set overlaid with the desired set, without
    /// computed attributes.
    #[must_use]
    pub const fn target(&self) -> &AttributeSet {
        &self.target
    }

    /// Fingerprint of the desired attributes.
    #[must_use]
    pub fn desired_hash(&self) -> &str {
        &self.desired_hash
    }
}

impl AttributeChange {
    /// Returns true if the entry requires remote work.
    #[must_use]
    pub const fn is_change(&self) -> bool {
        matches!(self.action, ChangeAction::UpdateInPlace | ChangeAction::Replace)
    }

    fn fmt_value(&self, value: Option<&AttributeValue>) -> String {
        match value {
            None => String::from("(unset)"),
            Some(_) if self.sensitive => REDACTED.to_string(),
            Some(v) => v.to_string(),
        }
    }
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unchanged => "unchanged",
            Self::UpdateInPlace => "update in-place",
            Self::Replace => "forces replacement",
            Self::ComputeOnCreate => "known after create",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoOp => "no-op",
            Self::Create => "create",
            Self::InPlace => "in-place",
            Self::Replace => "replace",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for AttributeChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.action {
            ChangeAction::ComputeOnCreate => write!(f, "{}: ({})", self.name, self.action),
            ChangeAction::Unchanged => write!(
                f,
                "{}: {}",
                self.name,
                self.fmt_value(self.old_value.as_ref().or(self.new_value.as_ref()))
            ),
            ChangeAction::UpdateInPlace | ChangeAction::Replace => write!(
                f,
                "{}: {} -> {} ({})",
                self.name,
                self.fmt_value(self.old_value.as_ref()),
                self.fmt_value(self.new_value.as_ref()),
                self.action
            ),
        }
    }
}

impl std::fmt::Debug for AttributeChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeChange")
            .field("name", &self.name)
            .field("old_value", &self.fmt_value(self.old_value.as_ref()))
            .field("new_value", &self.fmt_value(self.new_value.as_ref()))
            .field("action", &self.action)
            .finish()
    }
}

impl std::fmt::Display for Diff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mode)?;
        let changed: Vec<&str> = self.changed().map(|c| c.name.as_str()).collect();
        if !changed.is_empty() {
            write!(f, " ({})", changed.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VantageError;
    use crate::resource::{AttributeSpec, ValueType};

    fn schema() -> ResourceSchema {
        ResourceSchema::new("widget")
            .with_attribute("name", AttributeSpec::required(ValueType::String).forces_replacement())
            .with_attribute("group", AttributeSpec::optional(ValueType::String).forces_replacement())
            .with_attribute("size", AttributeSpec::optional(ValueType::Integer))
            .with_attribute("secret", AttributeSpec::optional(ValueType::String).sensitive())
            .with_attribute("status", AttributeSpec::computed(ValueType::String))
    }

    fn schema_error(err: VantageError) -> SchemaError {
        match err {
            VantageError::Schema(e) => e,
            other => panic!("expected schema violation, got {other}"),
        }
    }

    #[test]
    fn test_identical_sets_are_noop() {
        let engine = DiffEngine::new();
        let attrs = AttributeSet::new().with("name", "w1").with("group", "g1").with("size", 3);
        let diff = engine.compute_diff(&attrs, &attrs, &schema()).expect("valid");
        assert!(diff.is_empty());
        assert_eq!(diff.changed().count(), 0);
    }

    #[test]
    fn test_create_diff_lists_computed_attributes() {
        let engine = DiffEngine::new();
        let desired = AttributeSet::new().with("name", "w1");
        let diff = engine
            .compute_diff(&desired, &AttributeSet::new(), &schema())
            .expect("valid");
        assert_eq!(diff.mode(), ExecutionMode::Create);
        let status = diff.changes().iter().find(|c| c.name == "status").expect("listed");
        assert_eq!(status.action, ChangeAction::ComputeOnCreate);
    }

    #[test]
    fn test_in_place_change() {
        let engine = DiffEngine::new();
        let stored = AttributeSet::new().with("name", "w1").with("size", 3);
        let desired = AttributeSet::new().with("name", "w1").with("size", 5);
        let diff = engine.compute_diff(&desired, &stored, &schema()).expect("valid");
        assert_eq!(diff.mode(), ExecutionMode::InPlace);
        let changed: Vec<_> = diff.changed().map(|c| c.name.as_str()).collect();
        assert_eq!(changed, vec!["size"]);
    }

    #[test]
    fn test_replacement_attribute_wins_over_in_place() {
        let engine = DiffEngine::new();
        let stored = AttributeSet::new().with("name", "w1").with("group", "g1").with("size", 3);
        let desired = AttributeSet::new().with("name", "w1").with("group", "g2").with("size", 5);
        let diff = engine.compute_diff(&desired, &stored, &schema()).expect("valid");
        assert_eq!(diff.mode(), ExecutionMode::Replace);
    }

    #[test]
    fn test_omitted_optional_is_not_removed() {
        let engine = DiffEngine::new();
        let stored = AttributeSet::new().with("name", "w1").with("size", 3);
        let desired = AttributeSet::new().with("name", "w1").with("size", "");
        let diff = engine.compute_diff(&desired, &stored, &schema()).expect("valid");
        assert!(diff.is_empty());
        assert_eq!(diff.target().get("size"), Some(&AttributeValue::Integer(3)));
    }

    #[test]
    fn test_stored_computed_values_are_not_compared() {
        let engine = DiffEngine::new();
        let stored = AttributeSet::new().with("name", "w1").with("status", "ACTIVE");
        let desired = AttributeSet::new().with("name", "w1");
        let diff = engine.compute_diff(&desired, &stored, &schema()).expect("valid");
        assert!(diff.is_empty());
        assert!(diff.target().get("status").is_none());
    }

    #[test]
    fn test_missing_required() {
        let engine = DiffEngine::new();
        let desired = AttributeSet::new().with("name", "  ").with("size", 3);
        let err = engine
            .compute_diff(&desired, &AttributeSet::new(), &schema())
            .expect_err("name is required");
        assert_eq!(
            schema_error(err),
            SchemaError::MissingRequired {
                name: String::from("name")
            }
        );
    }

    #[test]
    fn test_unknown_and_computed_attributes_rejected() {
        let engine = DiffEngine::new();
        let unknown = AttributeSet::new().with("name", "w1").with("color", "red");
        assert!(matches!(
            schema_error(engine.compute_diff(&unknown, &AttributeSet::new(), &schema()).expect_err("unknown")),
            SchemaError::UnknownAttribute { .. }
        ));

        let computed = AttributeSet::new().with("name", "w1").with("status", "ACTIVE");
        assert!(matches!(
            schema_error(engine.compute_diff(&computed, &AttributeSet::new(), &schema()).expect_err("computed")),
            SchemaError::ComputedSupplied { .. }
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let engine = DiffEngine::new();
        let desired = AttributeSet::new().with("name", "w1").with("size", "big");
        let err = engine
            .compute_diff(&desired, &AttributeSet::new(), &schema())
            .expect_err("size is an integer");
        assert!(matches!(schema_error(err), SchemaError::TypeMismatch { .. }));
    }

    #[test]
    fn test_sensitive_values_are_masked() {
        let engine = DiffEngine::new();
        let stored = AttributeSet::new().with("name", "w1").with("secret", "old-secret");
        let desired = AttributeSet::new().with("name", "w1").with("secret", "new-secret");
        let diff = engine.compute_diff(&desired, &stored, &schema()).expect("valid");
        let rendered: Vec<String> = diff.changes().iter().map(|c| format!("{c} {c:?}")).collect();
        let joined = rendered.join("\n");
        assert!(!joined.contains("old-secret"));
        assert!(!joined.contains("new-secret"));
        assert!(joined.contains(REDACTED));
        assert!(!format!("{diff:?}").contains("new-secret"));
    }

    #[test]
    fn test_desired_hash_ignores_unset() {
        let engine = DiffEngine::new();
        let a = AttributeSet::new().with("name", "w1");
        let b = AttributeSet::new().with("name", "w1").with("group", "");
        let empty = AttributeSet::new();
        let da = engine.compute_diff(&a, &empty, &schema()).expect("valid");
        let db = engine.compute_diff(&b, &empty, &schema()).expect("valid");
        assert_eq!(da.desired_hash(), db.desired_hash());
        assert_eq!(da.desired(), db.desired());
    }
}
