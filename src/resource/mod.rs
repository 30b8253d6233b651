//! Resource data model.
//!
//! This module defines what a managed object looks like to the engine:
//! - Typed attribute values and attribute sets
//! - Per-attribute schemas with replacement and sensitivity flags
//! - Identities and the reconciliation state machine
//! - The Vantage compute profile resource

mod identity;
mod schema;
mod value;

pub mod compute_profile;

use std::sync::Arc;

use crate::planner::StatementDialect;

pub use identity::{ReconciliationState, ResourceIdentity, validate_transition};
pub use schema::{AttributeKind, AttributeSpec, ResourceSchema, ValueType};
pub use value::{AttributeSet, AttributeValue, REDACTED, Redacted};

/// Resource types that can appear in a configuration file.
pub const SUPPORTED_TYPES: &[&str] = &[compute_profile::RESOURCE_TYPE];

/// Schema and dialect of one resource type.
#[derive(Debug, Clone)]
pub struct ResourceDefinition {
    /// Attribute schema.
    pub schema: Arc<ResourceSchema>,
    /// Statement renderer.
    pub dialect: Arc<dyn StatementDialect>,
}

/// Looks up a resource type by name.
#[must_use]
pub fn definition(resource_type: &str) -> Option<ResourceDefinition> {
    match resource_type {
        compute_profile::RESOURCE_TYPE => Some(ResourceDefinition {
            schema: Arc::new(compute_profile::schema()),
            dialect: Arc::new(compute_profile::ComputeProfileDialect::new()),
        }),
        _ => None,
    }
}
