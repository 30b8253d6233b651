//! State types for tracking managed objects.
//!
//! One [`StateRecord`] is kept per identity. It is the only durable entity:
//! attribute sets and diffs are recomputed on every pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AttributeHasher;
use crate::error::{Result, StateError};
use crate::resource::{AttributeSet, ReconciliationState, ResourceIdentity};

/// Current version of the record format.
pub const STATE_VERSION: &str = "1";

/// Number of history entries kept per record.
pub const MAX_HISTORY: usize = 50;

/// Durable state of one managed object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Record format version.
    pub version: String,
    /// Identity of the object.
    pub identity: ResourceIdentity,
    /// Resource type name.
    pub resource_type: String,
    /// Operator-facing name from the configuration file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Reconciliation state.
    pub state: ReconciliationState,
    /// Last known attributes, computed ones included.
    pub attributes: AttributeSet,
    /// Fingerprint of `attributes`.
    #[serde(default)]
    pub attributes_hash: String,
    /// Error that left the record in its current state, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the identity was minted.
    pub created_at: DateTime<Utc>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
    /// Recent lifecycle operations, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// A single entry in a record's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the operation finished.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: Operation,
    /// State before the operation.
    pub from: ReconciliationState,
    /// State after the operation.
    pub to: ReconciliationState,
    /// Optional error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Types of lifecycle operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create pass.
    Create,
    /// Read (refresh) pass.
    Read,
    /// In-place update.
    Update,
    /// Drop-then-create replacement.
    Replace,
    /// Delete pass.
    Delete,
    /// Read against a tainted or interrupted record.
    Repair,
}

impl StateRecord {
    /// Creates a record for a freshly minted identity.
    #[must_use]
    pub fn new(
        identity: ResourceIdentity,
        resource_type: impl Into<String>,
        address: Option<String>,
        state: ReconciliationState,
        attributes: AttributeSet,
    ) -> Self {
        let now = Utc::now();
        let attributes_hash = AttributeHasher::new().hash_attributes(&attributes);
        Self {
            version: STATE_VERSION.to_string(),
            identity,
            resource_type: resource_type.into(),
            address,
            state,
            attributes,
            attributes_hash,
            last_error: None,
            created_at: now,
            updated_at: now,
            history: Vec::new(),
        }
    }

    /// Checks that the record can be read by this version.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::VersionMismatch`] for other record formats.
    pub fn check_version(&self) -> Result<()> {
        if self.version == STATE_VERSION {
            Ok(())
        } else {
            Err(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: self.version.clone(),
            }
            .into())
        }
    }

    /// Replaces the attributes and their fingerprint.
    pub fn set_attributes(&mut self, attributes: AttributeSet) {
        self.attributes_hash = AttributeHasher::new().hash_attributes(&attributes);
        self.attributes = attributes;
        self.updated_at = Utc::now();
    }

    /// Moves the record to a new state and records the operation.
    ///
    /// A failed operation keeps its error in `last_error`; a successful one
    /// clears it.
    pub fn record(&mut self, operation: Operation, to: ReconciliationState, error: Option<String>) {
        let entry = HistoryEntry {
            timestamp: Utc::now(),
            operation,
            from: self.state,
            to,
            error: error.clone(),
        };
        self.add_history(entry);
        self.state = to;
        self.last_error = error;
        self.updated_at = Utc::now();
    }

    /// Adds a history entry, keeping only the most recent ones.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::Repair => "repair",
        };
        write!(f, "{op}")
    }
}
