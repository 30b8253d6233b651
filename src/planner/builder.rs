//! Command construction from diffs.
//!
//! The builder is pure: it decides which commands a diff needs, in which
//! order and with which attributes, and leaves the remote syntax to a
//! [`StatementDialect`]. Every statement is rendered twice, once with real
//! values for the executor and once with sensitive values masked for logs.

use std::sync::Arc;

use tracing::debug;

use crate::error::{PlanError, Result};
use crate::resource::{AttributeSet, AttributeValue, ResourceIdentity, ResourceSchema, REDACTED};

use super::command::{Command, CommandKind, SuccessCriteria};
use super::diff::{ChangeAction, Diff, ExecutionMode};

/// One rendered clause: attribute name and value.
pub type Clause<'a> = (&'a str, &'a AttributeValue);

/// Renders remote statements for one resource type.
///
/// Clauses always arrive in the schema's canonical order and never contain
/// computed or unset attributes. `address` is the stored attribute set the
/// remote object is currently known by.
pub trait StatementDialect: Send + Sync + std::fmt::Debug {
    /// Renders the statement that creates an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the clauses cannot form a valid statement.
    fn create_statement(&self, clauses: &[Clause<'_>]) -> Result<String>;

    /// Renders the statement that alters the given clauses in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be addressed.
    fn alter_statement(&self, address: &AttributeSet, clauses: &[Clause<'_>]) -> Result<String>;

    /// Renders the statement that drops the object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be addressed.
    fn drop_statement(&self, address: &AttributeSet) -> Result<String>;

    /// Renders the statement that reads the object back, one column per
    /// attribute name.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be addressed.
    fn read_statement(&self, address: &AttributeSet) -> Result<String>;
}

/// Lifecycle action a command list is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Bring a new object into existence.
    Create,
    /// Converge an existing object.
    Update,
    /// Remove an existing object.
    Delete,
}

/// Builds commands from diffs.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    schema: Arc<ResourceSchema>,
    dialect: Arc<dyn StatementDialect>,
}

impl CommandBuilder {
    /// Creates a builder for one resource schema and its dialect.
    #[must_use]
    pub fn new(schema: Arc<ResourceSchema>, dialect: Arc<dyn StatementDialect>) -> Self {
        Self { schema, dialect }
    }

    /// Returns the schema commands are built for.
    #[must_use]
    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    /// Builds the ordered commands that apply `diff` for `action`.
    ///
    /// - Create: one create command with every set, non-computed attribute.
    /// - Update: nothing for a no-op diff, one alter for an in-place diff,
    ///   or drop followed by create for a replacement.
    /// - Delete: one drop that also succeeds if the object is already gone.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::InvalidAction`] if the diff does not fit the
    /// action, [`PlanError::MissingTarget`] if an existing object must be
    /// addressed without an identity, or a dialect error.
    pub fn build(
        &self,
        diff: &Diff,
        action: LifecycleAction,
        target: Option<&ResourceIdentity>,
    ) -> Result<Vec<Command>> {
        let commands = match (action, diff.mode()) {
            (LifecycleAction::Create, ExecutionMode::Create) => {
                vec![self.create_command(diff.target())?]
            }
            (LifecycleAction::Update, ExecutionMode::NoOp) => Vec::new(),
            (LifecycleAction::Update, ExecutionMode::InPlace) => {
                let target = Self::require_target(action, target)?;
                vec![self.alter_command(diff, target)?]
            }
            (LifecycleAction::Update, ExecutionMode::Replace) => {
                let target = Self::require_target(action, target)?;
                vec![
                    self.drop_command(diff.stored(), target)?,
                    self.create_command(diff.target())?,
                ]
            }
            (LifecycleAction::Delete, _) => {
                let target = Self::require_target(action, target)?;
                vec![self.drop_command(diff.stored(), target)?]
            }
            (action, mode) => {
                return Err(PlanError::InvalidAction {
                    action: action.to_string(),
                    mode: mode.to_string(),
                }
                .into());
            }
        };

        debug!(
            action = %action,
            mode = %diff.mode(),
            commands = commands.len(),
            "Built commands"
        );

        Ok(commands)
    }

    /// Builds the command that reads an object back from the remote system.
    ///
    /// # Errors
    ///
    /// Returns a dialect error if the stored attributes cannot address it.
    pub fn read(&self, stored: &AttributeSet, target: &ResourceIdentity) -> Result<Command> {
        let statement = self.dialect.read_statement(stored)?;
        let redacted = self.dialect.read_statement(&self.redact_set(stored))?;
        Ok(Command::new(CommandKind::Read, statement, redacted, SuccessCriteria::Row)
            .with_target(target.clone()))
    }

    fn require_target(
        action: LifecycleAction,
        target: Option<&ResourceIdentity>,
    ) -> Result<&ResourceIdentity> {
        target.ok_or_else(|| {
            PlanError::MissingTarget {
                action: action.to_string(),
            }
            .into()
        })
    }

    fn create_command(&self, attributes: &AttributeSet) -> Result<Command> {
        let clauses: Vec<Clause<'_>> = self
            .schema
            .iter()
            .filter(|(_, spec)| !spec.is_computed())
            .filter_map(|(name, _)| attributes.get_set(name).map(|v| (name, v)))
            .collect();

        let statement = self.dialect.create_statement(&clauses)?;
        let masked = self.redact_clauses(&clauses);
        let redacted = self.dialect.create_statement(&as_clauses(&masked))?;
        Ok(Command::new(CommandKind::Create, statement, redacted, SuccessCriteria::Applied))
    }

    fn alter_command(&self, diff: &Diff, target: &ResourceIdentity) -> Result<Command> {
        let clauses: Vec<Clause<'_>> = diff
            .changed()
            .filter(|c| c.action == ChangeAction::UpdateInPlace)
            .filter(|c| self.schema.get(&c.name).is_some_and(|spec| !spec.is_computed()))
            .filter_map(|c| c.new_value.as_ref().map(|v| (c.name.as_str(), v)))
            .collect();

        let statement = self.dialect.alter_statement(diff.stored(), &clauses)?;
        let masked = self.redact_clauses(&clauses);
        let redacted = self
            .dialect
            .alter_statement(&self.redact_set(diff.stored()), &as_clauses(&masked))?;
        Ok(
            Command::new(CommandKind::Alter, statement, redacted, SuccessCriteria::Applied)
                .with_target(target.clone()),
        )
    }

    fn drop_command(&self, stored: &AttributeSet, target: &ResourceIdentity) -> Result<Command> {
        let statement = self.dialect.drop_statement(stored)?;
        let redacted = self.dialect.drop_statement(&self.redact_set(stored))?;
        Ok(Command::new(
            CommandKind::Drop,
            statement,
            redacted,
            SuccessCriteria::AppliedOrAbsent,
        )
        .with_target(target.clone()))
    }

    fn redact_clauses<'a>(&self, clauses: &[Clause<'a>]) -> Vec<(&'a str, AttributeValue)> {
        clauses
            .iter()
            .map(|(name, value)| {
                if self.schema.is_sensitive(name) {
                    (*name, AttributeValue::string(REDACTED))
                } else {
                    (*name, (*value).clone())
                }
            })
            .collect()
    }

    fn redact_set(&self, attributes: &AttributeSet) -> AttributeSet {
        attributes
            .iter()
            .map(|(name, value)| {
                let value = if self.schema.is_sensitive(name) {
                    AttributeValue::string(REDACTED)
                } else {
                    value.clone()
                };
                (name.to_string(), value)
            })
            .collect()
    }
}

fn as_clauses<'a>(owned: &'a [(&str, AttributeValue)]) -> Vec<Clause<'a>> {
    owned.iter().map(|(name, value)| (*name, value)).collect()
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::DiffEngine;
    use crate::resource::{AttributeSpec, ValueType};

    /// Renders `VERB key=value ...` so tests can assert on clause order.
    #[derive(Debug)]
    struct PlainDialect;

    fn render(clauses: &[Clause<'_>]) -> String {
        clauses
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn name_of(address: &AttributeSet) -> Result<String> {
        address
            .get_set("name")
            .map(ToString::to_string)
            .ok_or_else(|| PlanError::Unaddressable { message: String::from("no name") }.into())
    }

    impl StatementDialect for PlainDialect {
        fn create_statement(&self, clauses: &[Clause<'_>]) -> Result<String> {
            Ok(format!("CREATE {}", render(clauses)))
        }

        fn alter_statement(&self, address: &AttributeSet, clauses: &[Clause<'_>]) -> Result<String> {
            Ok(format!("ALTER {} {}", name_of(address)?, render(clauses)))
        }

        fn drop_statement(&self, address: &AttributeSet) -> Result<String> {
            Ok(format!("DROP {}", name_of(address)?))
        }

        fn read_statement(&self, address: &AttributeSet) -> Result<String> {
            Ok(format!("READ {}", name_of(address)?))
        }
    }

    fn schema() -> ResourceSchema {
        ResourceSchema::new("widget")
            .with_attribute("name", AttributeSpec::required(ValueType::String).forces_replacement())
            .with_attribute("strategy", AttributeSpec::optional(ValueType::String))
            .with_attribute("size", AttributeSpec::optional(ValueType::Integer))
            .with_attribute("token", AttributeSpec::optional(ValueType::String).sensitive())
            .with_attribute("status", AttributeSpec::computed(ValueType::String))
    }

    fn builder() -> CommandBuilder {
        CommandBuilder::new(Arc::new(schema()), Arc::new(PlainDialect))
    }

    fn diff(desired: &AttributeSet, stored: &AttributeSet) -> Diff {
        DiffEngine::new()
            .compute_diff(desired, stored, &schema())
            .expect("valid diff")
    }

    #[test]
    fn test_create_omits_unset_attributes() {
        let desired = AttributeSet::new().with("name", "cg1").with("strategy", "");
        let commands = builder()
            .build(&diff(&desired, &AttributeSet::new()), LifecycleAction::Create, None)
            .expect("buildable");
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].kind(), CommandKind::Create);
        assert_eq!(commands[0].statement(), "CREATE name=cg1");
        assert!(!commands[0].statement().contains("strategy"));
    }

    #[test]
    fn test_create_uses_canonical_order() {
        let desired = AttributeSet::new().with("size", 2).with("strategy", "fast").with("name", "w");
        let commands = builder()
            .build(&diff(&desired, &AttributeSet::new()), LifecycleAction::Create, None)
            .expect("buildable");
        assert_eq!(commands[0].statement(), "CREATE name=w strategy=fast size=2");
    }

    #[test]
    fn test_replace_drops_then_creates() {
        let id = ResourceIdentity::from("id-1");
        let stored = AttributeSet::new().with("name", "x").with("size", 1);
        let desired = AttributeSet::new().with("name", "y");
        let commands = builder()
            .build(&diff(&desired, &stored), LifecycleAction::Update, Some(&id))
            .expect("buildable");
        let kinds: Vec<_> = commands.iter().map(Command::kind).collect();
        assert_eq!(kinds, vec![CommandKind::Drop, CommandKind::Create]);
        assert_eq!(commands[0].statement(), "DROP x");
        assert_eq!(commands[0].target(), Some(&id));
        // The new object keeps optional values the desired set omitted.
        assert_eq!(commands[1].statement(), "CREATE name=y size=1");
        assert_eq!(commands[1].target(), None);
    }

    #[test]
    fn test_in_place_alters_only_changed_attributes() {
        let id = ResourceIdentity::from("id-1");
        let stored = AttributeSet::new()
            .with("name", "w")
            .with("strategy", "fast")
            .with("size", 1)
            .with("status", "ACTIVE");
        let desired = AttributeSet::new().with("name", "w").with("strategy", "fast").with("size", 4);
        let commands = builder()
            .build(&diff(&desired, &stored), LifecycleAction::Update, Some(&id))
            .expect("buildable");
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].statement(), "ALTER w size=4");
    }

    #[test]
    fn test_noop_update_builds_nothing() {
        let stored = AttributeSet::new().with("name", "w");
        let commands = builder()
            .build(&diff(&stored, &stored), LifecycleAction::Update, None)
            .expect("buildable");
        assert!(commands.is_empty());
    }

    #[test]
    fn test_delete_tolerates_absence() {
        let id = ResourceIdentity::from("id-1");
        let stored = AttributeSet::new().with("name", "w");
        let commands = builder()
            .build(&Diff::teardown(&stored), LifecycleAction::Delete, Some(&id))
            .expect("buildable");
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].kind(), CommandKind::Drop);
        assert!(commands[0].tolerates_absence());
    }

    #[test]
    fn test_mismatched_action_and_target() {
        let desired = AttributeSet::new().with("name", "w");
        let create_diff = diff(&desired, &AttributeSet::new());
        assert!(builder().build(&create_diff, LifecycleAction::Update, None).is_err());

        let stored = AttributeSet::new().with("name", "w");
        let err = builder()
            .build(&Diff::teardown(&stored), LifecycleAction::Delete, None)
            .expect_err("delete needs a target");
        assert!(err.to_string().contains("requires a target identity"));
    }

    #[test]
    fn test_sensitive_values_only_in_statement() {
        let desired = AttributeSet::new().with("name", "w").with("token", "s3cr3t");
        let commands = builder()
            .build(&diff(&desired, &AttributeSet::new()), LifecycleAction::Create, None)
            .expect("buildable");
        assert!(commands[0].statement().contains("token=s3cr3t"));
        assert!(commands[0].redacted().contains("token=(sensitive)"));
        assert!(!commands[0].to_string().contains("s3cr3t"));
    }

    #[test]
    fn test_read_command() {
        let id = ResourceIdentity::from("id-1");
        let stored = AttributeSet::new().with("name", "w");
        let command = builder().read(&stored, &id).expect("buildable");
        assert_eq!(command.kind(), CommandKind::Read);
        assert_eq!(command.criteria(), SuccessCriteria::Row);
        assert_eq!(command.statement(), "READ w");
    }
}
