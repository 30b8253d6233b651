//! Immutable remote commands.

use std::fmt;

use crate::resource::ResourceIdentity;

/// What a command does to the remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Creates the object.
    Create,
    /// Mutates the object in place.
    Alter,
    /// Removes the object.
    Drop,
    /// Reads the object's current attributes.
    Read,
}

/// What the executor must observe for the command to count as successful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessCriteria {
    /// The statement ran without error.
    Applied,
    /// The statement ran, or the object was already gone.
    AppliedOrAbsent,
    /// The statement returned the object's row; no rows means absent.
    Row,
}

/// A rendered instruction for the remote executor.
///
/// Commands are built by the planner and never changed afterwards. The
/// statement may contain sensitive values, so `Debug` and `Display` only
/// ever show the redacted form.
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    kind: CommandKind,
    target: Option<ResourceIdentity>,
    statement: String,
    redacted: String,
    criteria: SuccessCriteria,
}

impl Command {
    /// Creates a command from a statement and its redacted rendering.
    #[must_use]
    pub fn new(
        kind: CommandKind,
        statement: impl Into<String>,
        redacted: impl Into<String>,
        criteria: SuccessCriteria,
    ) -> Self {
        Self {
            kind,
            target: None,
            statement: statement.into(),
            redacted: redacted.into(),
            criteria,
        }
    }

    /// Addresses the command to an existing identity.
    #[must_use]
    pub fn with_target(mut self, target: ResourceIdentity) -> Self {
        self.target = Some(target);
        self
    }

    /// Command kind.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Identity this command addresses, if any.
    #[must_use]
    pub const fn target(&self) -> Option<&ResourceIdentity> {
        self.target.as_ref()
    }

    /// Full statement to send to the remote system.
    #[must_use]
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Statement with sensitive values masked.
    #[must_use]
    pub fn redacted(&self) -> &str {
        &self.redacted
    }

    /// Success criteria.
    #[must_use]
    pub const fn criteria(&self) -> SuccessCriteria {
        self.criteria
    }

    /// Returns true if an "object does not exist" answer counts as success.
    #[must_use]
    pub const fn tolerates_absence(&self) -> bool {
        matches!(
            self.criteria,
            SuccessCriteria::AppliedOrAbsent | SuccessCriteria::Row
        )
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("statement", &self.redacted)
            .field("criteria", &self.criteria)
            .finish()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}`", self.kind, self.redacted)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Alter => "alter",
            Self::Drop => "drop",
            Self::Read => "read",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_uses_redacted_statement() {
        let cmd = Command::new(
            CommandKind::Create,
            "CREATE USER x PASSWORD = hunter2",
            "CREATE USER x PASSWORD = (sensitive)",
            SuccessCriteria::Applied,
        );
        assert!(!format!("{cmd:?}").contains("hunter2"));
        assert!(!cmd.to_string().contains("hunter2"));
        assert_eq!(cmd.statement(), "CREATE USER x PASSWORD = hunter2");
    }

    #[test]
    fn test_absence_tolerance() {
        let drop = Command::new(CommandKind::Drop, "DROP x", "DROP x", SuccessCriteria::AppliedOrAbsent);
        let create = Command::new(CommandKind::Create, "CREATE x", "CREATE x", SuccessCriteria::Applied);
        assert!(drop.tolerates_absence());
        assert!(!create.tolerates_absence());
    }
}
