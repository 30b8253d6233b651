//! Error types for the Vantage reconciliation engine.
//!
//! The hierarchy mirrors the lifecycle of a reconciliation pass: schema
//! validation, planning, remote execution, state persistence and the
//! lifecycle state machine itself.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the reconciliation engine.
#[derive(Debug, Error)]
pub enum VantageError {
    /// Desired attributes do not satisfy the resource schema.
    #[error("Schema violation: {0}")]
    Schema(#[from] SchemaError),

    /// Configuration file errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State store errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Remote executor errors.
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// Command planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Lifecycle state machine errors.
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Violations of a resource schema by a desired attribute set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// A required attribute is missing or unset.
    #[error("required attribute '{name}' is missing")]
    MissingRequired {
        /// Attribute name.
        name: String,
    },

    /// The attribute is not part of the schema.
    #[error("unknown attribute '{name}' for resource type {resource_type}")]
    UnknownAttribute {
        /// Attribute name.
        name: String,
        /// Resource type the schema describes.
        resource_type: String,
    },

    /// A server-assigned attribute was supplied by the caller.
    #[error("attribute '{name}' is computed by the server and cannot be set")]
    ComputedSupplied {
        /// Attribute name.
        name: String,
    },

    /// The value does not have the type the schema declares.
    #[error("attribute '{name}' expects a {expected} value, got {found}")]
    TypeMismatch {
        /// Attribute name.
        name: String,
        /// Declared type.
        expected: String,
        /// Type of the supplied value.
        found: String,
    },
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Duplicate resource definition.
    #[error("Duplicate resource name: {name}")]
    DuplicateName {
        /// The duplicated name.
        name: String,
    },

    /// Resource type with no registered schema.
    #[error("Unsupported resource type: {resource_type}")]
    UnsupportedResourceType {
        /// The unsupported type.
        resource_type: String,
    },
}

/// State store errors. Any of these aborts a pass before the executor runs.
#[derive(Debug, Error)]
pub enum StateError {
    /// A stored record could not be read or parsed.
    #[error("State record is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// The backend could not be reached or written.
    #[error("State backend unavailable: {message}")]
    Unavailable {
        /// Description of the backend failure.
        message: String,
    },

    /// Lease acquisition or renewal failed.
    #[error("State lock failed: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// The identity is leased by another holder.
    #[error("Resource {identity} is locked by {holder} since {since}")]
    LockedByOther {
        /// Leased identity.
        identity: String,
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// The identity cannot be used as a storage key.
    #[error("Invalid state key: {key}")]
    InvalidKey {
        /// Offending identity.
        key: String,
    },

    /// S3 backend error.
    #[error("S3 state backend error: {message}")]
    S3Error {
        /// Description of the S3 error.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Errors surfaced across the remote executor boundary.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The remote call definitively failed; no change occurred.
    #[error("{command} failed: {message}")]
    Failure {
        /// Redacted command description.
        command: String,
        /// Failure detail.
        message: String,
    },

    /// The remote effect of the call is unknown.
    #[error("{command} had an unknown outcome: {message}")]
    Ambiguous {
        /// Redacted command description.
        command: String,
        /// Ambiguity detail.
        message: String,
    },

    /// Transport-level failure inside an executor adapter.
    #[error("Network error: {message}")]
    Network {
        /// Description of the network error.
        message: String,
    },

    /// The remote system rejected the request before running it.
    #[error("Remote system unavailable ({status}): {message}")]
    Unavailable {
        /// HTTP status code.
        status: u16,
        /// Error message from the remote system.
        message: String,
    },

    /// The remote system answered with something we cannot interpret.
    #[error("Invalid response from remote system: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Command planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The requested action does not fit the diff.
    #[error("cannot build {action} commands for a {mode} diff")]
    InvalidAction {
        /// Requested lifecycle action.
        action: String,
        /// Execution mode of the diff.
        mode: String,
    },

    /// A command that must address an identity was built without one.
    #[error("{action} requires a target identity")]
    MissingTarget {
        /// Requested lifecycle action.
        action: String,
    },

    /// The dialect has no clause for the attribute.
    #[error("no {statement} clause for attribute '{name}'")]
    UnsupportedClause {
        /// Statement being rendered.
        statement: String,
        /// Attribute name.
        name: String,
    },

    /// The dialect could not address the object from stored attributes.
    #[error("cannot address object: {message}")]
    Unaddressable {
        /// Description of what is missing.
        message: String,
    },
}

/// Lifecycle state machine errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// No stored record exists for the identity.
    #[error("No managed object with identity {identity}")]
    UnknownIdentity {
        /// Requested identity.
        identity: String,
    },

    /// The object must be repaired before it can be mutated.
    #[error("Object {identity} is {state}; run a repair (read) pass first")]
    NeedsRepair {
        /// Affected identity.
        identity: String,
        /// Current reconciliation state.
        state: String,
    },

    /// The state machine does not allow this transition.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },

    /// The stored record belongs to another resource type.
    #[error("Identity {identity} holds a {found} record, expected {expected}")]
    ResourceTypeMismatch {
        /// Affected identity.
        identity: String,
        /// Resource type handled by this reconciler.
        expected: String,
        /// Resource type in the record.
        found: String,
    },
}

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, VantageError>;

impl VantageError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if an executor adapter may safely resend the request.
    ///
    /// Only failures where the remote system never ran the statement qualify.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Executor(ExecutorError::Network { .. } | ExecutorError::Unavailable { .. })
        )
    }

    /// Returns true for a schema violation.
    #[must_use]
    pub const fn is_schema_violation(&self) -> bool {
        matches!(self, Self::Schema(_))
    }

    /// Returns true for a state store failure.
    #[must_use]
    pub const fn is_store_failure(&self) -> bool {
        matches!(self, Self::State(_))
    }

    /// Returns true if the remote effect of the pass is unknown.
    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Executor(ExecutorError::Ambiguous { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl StateError {
    /// Creates an S3 error with the given message.
    #[must_use]
    pub fn s3(message: impl Into<String>) -> Self {
        Self::S3Error {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a backend-unavailable error with the given message.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

impl ExecutorError {
    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(status: u16, message: impl Into<String>) -> Self {
        Self::Unavailable {
            status,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let network = VantageError::Executor(ExecutorError::network("connection refused"));
        assert!(network.is_retryable());
        assert!(VantageError::Executor(ExecutorError::unavailable(503, "")).is_retryable());

        let ambiguous = VantageError::Executor(ExecutorError::Ambiguous {
            command: String::from("create"),
            message: String::from("timed out"),
        });
        assert!(!ambiguous.is_retryable());
        assert!(ambiguous.is_ambiguous());
    }

    #[test]
    fn test_schema_violation_display() {
        let err = VantageError::from(SchemaError::MissingRequired {
            name: String::from("compute_profile_name"),
        });
        assert!(err.is_schema_violation());
        assert_eq!(
            err.to_string(),
            "Schema violation: required attribute 'compute_profile_name' is missing"
        );
    }
}
