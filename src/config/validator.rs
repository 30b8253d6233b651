//! Configuration validation.
//!
//! Structural checks run before any state is touched: connection settings,
//! state backend settings, resource names and types, and every resource's
//! attributes against its schema. All problems are collected so that one
//! `validate` run reports everything at once.

use crate::error::{ConfigError, Result};
use crate::planner::DiffEngine;
use crate::resource::{self, AttributeSet, SUPPORTED_TYPES};
use crate::state::DEFAULT_LEASE_TTL;
use std::collections::HashSet;
use tracing::debug;

use super::spec::{ConnectionConfig, ResourceConfig, StateBackend, StateConfig, VantageConfig};

/// Validator for configuration files.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    diff_engine: DiffEngine,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            diff_engine: DiffEngine::new(),
        }
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateName`] if two resources share a
    /// name, otherwise the first validation error found.
    pub fn validate(&self, config: &VantageConfig) -> Result<ValidationResult> {
        let result = self.check(config)?;

        match result.errors.first() {
            None => {
                debug!("Configuration validation passed");
                Ok(result)
            }
            Some(first_error) => {
                Err(ConfigError::validation(first_error.message.clone(), first_error.field.clone()).into())
            }
        }
    }

    /// Collects every error and warning without failing on them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateName`] if two resources share a name.
    pub fn check(&self, config: &VantageConfig) -> Result<ValidationResult> {
        Self::check_unique_names(&config.resources)?;

        let mut result = ValidationResult::default();
        Self::validate_connection(&config.connection, &mut result);
        Self::validate_state(&config.state, &mut result);
        self.validate_resources(&config.resources, &mut result);
        Ok(result)
    }

    /// Fails on the first resource name used twice.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateName`].
    pub fn check_unique_names(resources: &[ResourceConfig]) -> Result<()> {
        let mut seen = HashSet::new();
        for resource in resources {
            if !seen.insert(resource.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    name: resource.name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Validates connection configuration.
    fn validate_connection(connection: &ConnectionConfig, result: &mut ValidationResult) {
        if connection.base_url.is_empty() {
            result.push("connection.base_url", "Query Service URL cannot be empty");
        } else if !connection.base_url.starts_with("https://")
            && !connection.base_url.starts_with("http://")
        {
            result.push(
                "connection.base_url",
                format!(
                    "Query Service URL '{}' must start with http:// or https://",
                    connection.base_url
                ),
            );
        } else if connection.base_url.starts_with("http://") {
            result
                .warnings
                .push(String::from("connection.base_url uses plain HTTP; credentials are sent unencrypted"));
        }

        if connection.system.trim().is_empty() {
            result.push("connection.system", "System name cannot be empty");
        }

        if connection.user.trim().is_empty() {
            result.push("connection.user", "User cannot be empty");
        }

        if connection.timeout_secs == 0 {
            result.push("connection.timeout_secs", "Request timeout must be at least 1 second");
        }

        if connection.command_timeout_secs < connection.timeout_secs {
            result.push(
                "connection.command_timeout_secs",
                "Command timeout must not be shorter than the request timeout",
            );
        }

        if connection.command_timeout_secs >= DEFAULT_LEASE_TTL.as_secs() {
            result.push(
                "connection.command_timeout_secs",
                format!(
                    "Command timeout must be shorter than the {}s state lease",
                    DEFAULT_LEASE_TTL.as_secs()
                ),
            );
        }
    }

    /// Validates state configuration.
    fn validate_state(state: &StateConfig, result: &mut ValidationResult) {
        match state.backend {
            StateBackend::S3 => {
                if state.bucket.as_ref().is_none_or(|b| b.trim().is_empty()) {
                    result.push("state.bucket", "S3 bucket name is required when using S3 backend");
                }
            }
            StateBackend::Local => {
                if state.bucket.is_some() {
                    result
                        .warnings
                        .push(String::from("state.bucket is ignored by the local backend"));
                }
            }
            StateBackend::Memory => {
                result
                    .warnings
                    .push(String::from("memory state backend keeps nothing after the run"));
            }
        }
    }

    /// Validates resource entries.
    fn validate_resources(&self, resources: &[ResourceConfig], result: &mut ValidationResult) {
        if resources.is_empty() {
            result.warnings.push(String::from("No resources declared"));
        }

        for (i, resource) in resources.iter().enumerate() {
            let prefix = format!("resources[{i}]");

            if !is_valid_name(&resource.name) {
                result.push(
                    format!("{prefix}.name"),
                    format!(
                        "Resource name '{}' is invalid. Must be lowercase alphanumeric with hyphens or underscores.",
                        resource.name
                    ),
                );
            }

            let Some(definition) = resource::definition(&resource.resource_type) else {
                result.push(
                    format!("{prefix}.type"),
                    format!(
                        "Unsupported resource type '{}' (supported: {})",
                        resource.resource_type,
                        SUPPORTED_TYPES.join(", ")
                    ),
                );
                continue;
            };

            if let Err(e) =
                self.diff_engine
                    .compute_diff(&resource.attributes, &AttributeSet::new(), &definition.schema)
            {
                result.push(format!("{prefix}.attributes"), e.to_string());
            }
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens or underscores, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    // First character must be a letter
    if !chars.next().is_some_and(|c| c.is_ascii_lowercase()) {
        return false;
    }

    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_'))
        && !name.ends_with(['-', '_'])
}

impl ValidationResult {
    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
