//! Resource identities and reconciliation states.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{LifecycleError, Result};

/// Opaque, stable identifier of one managed object instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceIdentity(String);

impl ResourceIdentity {
    /// Mints a fresh identity.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identity is safe to use as a file or object key.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 128
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
    }

    /// Short form for display.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ResourceIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Where a managed object is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationState {
    /// No object exists and no record is stored.
    Absent,
    /// A create command is in flight.
    Creating,
    /// The object exists with the stored attributes.
    Present,
    /// An update is in flight.
    Updating,
    /// A delete is in flight.
    Deleting,
    /// The last operation left remote consistency unknown.
    Tainted,
}

impl ReconciliationState {
    /// Returns true if a stored record (and therefore an identity) exists.
    #[must_use]
    pub const fn holds_identity(self) -> bool {
        !matches!(self, Self::Absent)
    }

    /// Returns true for in-flight states.
    ///
    /// Finding one of these at the start of a pass means the previous pass
    /// stopped before recording its outcome.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Creating | Self::Updating | Self::Deleting)
    }

    /// Returns true if only a repair (read) pass may run next.
    #[must_use]
    pub const fn needs_repair(self) -> bool {
        matches!(self, Self::Tainted) || self.is_in_flight()
    }
}

impl fmt::Display for ReconciliationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Creating => "creating",
            Self::Present => "present",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
            Self::Tainted => "tainted",
        };
        write!(f, "{s}")
    }
}

/// Checks a lifecycle transition against the state machine.
///
/// Callers treat a record found in flight as `tainted` before validating,
/// since its remote outcome was never recorded.
///
/// # Errors
///
/// Returns [`LifecycleError::InvalidTransition`] for any other move.
pub fn validate_transition(from: ReconciliationState, to: ReconciliationState) -> Result<()> {
    use ReconciliationState::{Absent, Creating, Deleting, Present, Tainted, Updating};

    let valid = matches!(
        (from, to),
        (Absent, Creating)
            | (Creating, Present | Absent | Tainted)
            | (Present, Present | Updating | Deleting | Absent)
            | (Updating, Present | Absent | Tainted)
            | (Deleting, Absent | Tainted)
            | (Tainted, Deleting | Absent | Present | Tainted)
    );

    if valid {
        Ok(())
    } else {
        Err(LifecycleError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReconciliationState::{Absent, Creating, Deleting, Present, Tainted, Updating};

    #[test]
    fn valid_transitions() {
        assert!(validate_transition(Absent, Creating).is_ok());
        assert!(validate_transition(Creating, Present).is_ok());
        assert!(validate_transition(Creating, Absent).is_ok());
        assert!(validate_transition(Creating, Tainted).is_ok());
        assert!(validate_transition(Present, Present).is_ok()); // refresh
        assert!(validate_transition(Present, Absent).is_ok()); // drift
        assert!(validate_transition(Present, Updating).is_ok());
        assert!(validate_transition(Updating, Present).is_ok());
        assert!(validate_transition(Updating, Tainted).is_ok());
        assert!(validate_transition(Present, Deleting).is_ok());
        assert!(validate_transition(Tainted, Deleting).is_ok());
        assert!(validate_transition(Deleting, Absent).is_ok());
        assert!(validate_transition(Deleting, Tainted).is_ok());
        assert!(validate_transition(Tainted, Present).is_ok());
        assert!(validate_transition(Tainted, Absent).is_ok());
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(Absent, Present).is_err());
        assert!(validate_transition(Absent, Updating).is_err());
        assert!(validate_transition(Tainted, Updating).is_err());
        assert!(validate_transition(Present, Creating).is_err());
        assert!(validate_transition(Deleting, Present).is_err());
        assert!(validate_transition(Present, Tainted).is_err());
    }

    #[test]
    fn test_identity_holders() {
        assert!(!Absent.holds_identity());
        for state in [Creating, Present, Updating, Deleting, Tainted] {
            assert!(state.holds_identity());
        }
        assert!(Tainted.needs_repair());
        assert!(Creating.needs_repair());
        assert!(!Present.needs_repair());
    }

    #[test]
    fn test_generated_identities_are_unique() {
        let a = ResourceIdentity::generate();
        let b = ResourceIdentity::generate();
        assert_ne!(a, b);
        assert_eq!(a.short().len(), 8);
        assert!(a.is_well_formed());
    }

    #[test]
    fn test_malformed_identities() {
        assert!(!ResourceIdentity::from("").is_well_formed());
        assert!(!ResourceIdentity::from("../etc/passwd").is_well_formed());
        assert!(!ResourceIdentity::from("a b").is_well_formed());
    }
}
