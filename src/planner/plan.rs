//! Reconciliation plan types.
//!
//! A plan is a dry run: the diff and the exact commands a pass would send,
//! computed without touching the remote system or the state store.

use chrono::{DateTime, Utc};

use crate::resource::{ReconciliationState, ResourceIdentity};

use super::command::Command;
use super::diff::{AttributeChange, Diff, ExecutionMode};

/// A complete plan across configured resources.
#[derive(Debug)]
pub struct Plan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// One entry per resource, in configuration order; removals last.
    pub resources: Vec<ResourcePlan>,
}

/// The planned outcome for one resource.
#[derive(Debug, Clone)]
pub struct ResourcePlan {
    /// Operator-facing resource name.
    pub address: String,
    /// Resource type.
    pub resource_type: String,
    /// Identity of the existing object (if any).
    pub identity: Option<ResourceIdentity>,
    /// Action type.
    pub action: ActionType,
    /// Per-attribute changes.
    pub changes: Vec<AttributeChange>,
    /// Commands the pass would send, in order.
    pub commands: Vec<Command>,
    /// Reason for this action.
    pub reason: String,
    /// Fingerprint of the desired attributes (if any).
    pub desired_hash: Option<String>,
}

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    /// Create a new object.
    Create,
    /// Alter the existing object in place.
    Update,
    /// Drop the object and create it again.
    Replace,
    /// Drop the object.
    Delete,
    /// The stored record must be repaired before anything else runs.
    Repair,
    /// Nothing to do.
    NoOp,
}

impl Plan {
    /// Creates a plan from per-resource entries.
    #[must_use]
    pub fn new(resources: Vec<ResourcePlan>) -> Self {
        Self {
            created_at: Utc::now(),
            resources,
        }
    }

    /// Returns true if no resource needs any action.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.iter().all(|r| r.action == ActionType::NoOp)
    }

    /// Returns the entries that need action.
    #[must_use]
    pub fn actionable(&self) -> Vec<&ResourcePlan> {
        self.resources
            .iter()
            .filter(|r| r.action != ActionType::NoOp)
            .collect()
    }

    /// Returns the number of entries with the given action.
    #[must_use]
    pub fn count(&self, action: ActionType) -> usize {
        self.resources.iter().filter(|r| r.action == action).count()
    }
}

impl ResourcePlan {
    /// Creates a plan entry from a diff and the commands built for it.
    #[must_use]
    pub fn from_diff(
        address: impl Into<String>,
        resource_type: impl Into<String>,
        identity: Option<ResourceIdentity>,
        diff: &Diff,
        commands: Vec<Command>,
    ) -> Self {
        let (action, reason) = match diff.mode() {
            ExecutionMode::Create => (ActionType::Create, String::from("not yet created")),
            ExecutionMode::InPlace => (ActionType::Update, Self::changed_reason(diff, "changed")),
            ExecutionMode::Replace => (
                ActionType::Replace,
                Self::changed_reason(diff, "forces replacement"),
            ),
            ExecutionMode::Delete => (
                ActionType::Delete,
                String::from("removed from configuration"),
            ),
            ExecutionMode::NoOp => (ActionType::NoOp, String::new()),
        };

        let desired_hash = (!diff.desired_hash().is_empty()).then(|| diff.desired_hash().to_string());

        Self {
            address: address.into(),
            resource_type: resource_type.into(),
            identity,
            action,
            changes: diff.changes().to_vec(),
            commands,
            reason,
            desired_hash,
        }
    }

    /// Creates an entry for a record that needs a repair pass first.
    #[must_use]
    pub fn repair(
        address: impl Into<String>,
        resource_type: impl Into<String>,
        identity: ResourceIdentity,
        state: ReconciliationState,
    ) -> Self {
        Self {
            address: address.into(),
            resource_type: resource_type.into(),
            identity: Some(identity),
            action: ActionType::Repair,
            changes: Vec::new(),
            commands: Vec::new(),
            reason: format!("record is {state}; remote outcome unknown"),
            desired_hash: None,
        }
    }

    fn changed_reason(diff: &Diff, verb: &str) -> String {
        let names: Vec<&str> = diff.changed().map(|c| c.name.as_str()).collect();
        format!("{} {verb}", names.join(", "))
    }

    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self.action {
            ActionType::Create => format!("Create {} '{}'", self.resource_type, self.address),
            ActionType::Update => format!("Update {} '{}' in place", self.resource_type, self.address),
            ActionType::Replace => format!("Replace {} '{}'", self.resource_type, self.address),
            ActionType::Delete => format!("Delete {} '{}'", self.resource_type, self.address),
            ActionType::Repair => format!("Repair {} '{}'", self.resource_type, self.address),
            ActionType::NoOp => format!("No change for '{}'", self.address),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::Repair => "repair",
            Self::NoOp => "noop",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ResourcePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action, self.address)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let actionable = self.actionable();
        if actionable.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Reconciliation Plan ({} actions):", actionable.len())?;
        for (i, resource) in actionable.iter().enumerate() {
            writeln!(f, "  {i}. {resource}")?;
            for command in &resource.commands {
                writeln!(f, "       {command}")?;
            }
        }

        Ok(())
    }
}
