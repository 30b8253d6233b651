//! Vantage compute profile resource.
//!
//! A compute profile belongs to a compute group and tells the system which
//! instance type and map its queries run on. The DDL grammar is:
//!
//! ```text
//! CREATE COMPUTE PROFILE <name> [IN <group>]
//!     [, INSTANCE = <map>] [, INSTANCE TYPE = <strategy>]
//!     [, TIMEOUT = <seconds>] [USING <attributes>]
//! ```

use crate::error::{PlanError, Result};
use crate::planner::{Clause, StatementDialect};

use super::schema::{AttributeSpec, ResourceSchema, ValueType};
use super::value::{AttributeSet, AttributeValue};

/// Resource type name used in configuration files and state records.
pub const RESOURCE_TYPE: &str = "compute_profile";

/// Profile name.
pub const NAME: &str = "compute_profile_name";
/// Owning compute group.
pub const GROUP: &str = "compute_group_name";
/// Compute map the profile's instances run on.
pub const MAP: &str = "compute_map";
/// Instance type (query strategy).
pub const STRATEGY: &str = "query_strategy";
/// Idle timeout in seconds.
pub const TIMEOUT: &str = "timeout";
/// Free-form `USING` clause (e.g. `MIN_COMPUTE_COUNT(1) MAX_COMPUTE_COUNT(3)`).
pub const ATTRIBUTE: &str = "compute_attribute";
/// State reported by the system.
pub const PROFILE_STATE: &str = "profile_state";

/// Returns the compute profile schema, in DDL clause order.
#[must_use]
pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_attribute(NAME, AttributeSpec::required(ValueType::String).forces_replacement())
        .with_attribute(GROUP, AttributeSpec::optional(ValueType::String).forces_replacement())
        .with_attribute(MAP, AttributeSpec::optional(ValueType::String))
        .with_attribute(STRATEGY, AttributeSpec::optional(ValueType::String))
        .with_attribute(TIMEOUT, AttributeSpec::optional(ValueType::Integer))
        .with_attribute(ATTRIBUTE, AttributeSpec::optional(ValueType::String))
        .with_attribute(PROFILE_STATE, AttributeSpec::computed(ValueType::String))
}

/// Teradata SQL dialect for compute profiles.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComputeProfileDialect;

impl ComputeProfileDialect {
    /// Creates the dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// `<name>[ IN <group>]` for addressing an existing profile.
    fn address(address: &AttributeSet) -> Result<String> {
        let name = address.get_set(NAME).ok_or_else(|| PlanError::Unaddressable {
            message: format!("stored attributes have no {NAME}"),
        })?;
        let mut target = identifier(name);
        if let Some(group) = address.get_set(GROUP) {
            target.push_str(" IN ");
            target.push_str(&identifier(group));
        }
        Ok(target)
    }

    /// Appends an optional clause shared by CREATE and ALTER.
    fn push_option(sql: &mut String, statement: &str, name: &str, value: &AttributeValue) -> Result<()> {
        match name {
            MAP => {
                sql.push_str(", INSTANCE = ");
                sql.push_str(&identifier(value));
            }
            STRATEGY => {
                sql.push_str(", INSTANCE TYPE = ");
                sql.push_str(&identifier(value));
            }
            TIMEOUT => {
                sql.push_str(", TIMEOUT = ");
                sql.push_str(&value.to_string());
            }
            ATTRIBUTE => {
                sql.push_str(" USING ");
                sql.push_str(&value.to_string());
            }
            other => {
                return Err(PlanError::UnsupportedClause {
                    statement: statement.to_string(),
                    name: other.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

impl StatementDialect for ComputeProfileDialect {
    fn create_statement(&self, clauses: &[Clause<'_>]) -> Result<String> {
        let name = clauses
            .iter()
            .find(|(n, _)| *n == NAME)
            .map(|(_, v)| *v)
            .ok_or_else(|| PlanError::Unaddressable {
                message: format!("{NAME} is required to create a compute profile"),
            })?;

        let mut sql = format!("CREATE COMPUTE PROFILE {}", identifier(name));
        for (attr, value) in clauses {
            match *attr {
                NAME => {}
                GROUP => {
                    sql.push_str(" IN ");
                    sql.push_str(&identifier(value));
                }
                other => Self::push_option(&mut sql, "CREATE", other, value)?,
            }
        }
        Ok(sql)
    }

    fn alter_statement(&self, address: &AttributeSet, clauses: &[Clause<'_>]) -> Result<String> {
        let mut sql = format!("ALTER COMPUTE PROFILE {}", Self::address(address)?);
        for (attr, value) in clauses {
            Self::push_option(&mut sql, "ALTER", attr, value)?;
        }
        Ok(sql)
    }

    fn drop_statement(&self, address: &AttributeSet) -> Result<String> {
        Ok(format!("DROP COMPUTE PROFILE {}", Self::address(address)?))
    }

    fn read_statement(&self, address: &AttributeSet) -> Result<String> {
        let name = address.get_set(NAME).ok_or_else(|| PlanError::Unaddressable {
            message: format!("stored attributes have no {NAME}"),
        })?;

        let mut sql = format!(
            "SELECT ComputeProfileName AS {NAME}, ComputeGroupName AS {GROUP}, \
             ComputeMapName AS {MAP}, InstanceType AS {STRATEGY}, \
             ProfileState AS {PROFILE_STATE} \
             FROM DBC.ComputeProfilesV WHERE ComputeProfileName = {}",
            literal(name)
        );
        if let Some(group) = address.get_set(GROUP) {
            sql.push_str(" AND ComputeGroupName = ");
            sql.push_str(&literal(group));
        }
        Ok(sql)
    }
}

/// Renders an object name, double-quoting anything but a plain identifier.
fn identifier(value: &AttributeValue) -> String {
    let raw = value.to_string();
    let plain = raw
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '#'));
    if plain {
        raw
    } else {
        format!("\"{}\"", raw.replace('"', "\"\""))
    }
}

/// Renders a string literal.
fn literal(value: &AttributeValue) -> String {
    format!("'{}'", value.to_string().replace('\'', "''"))
}
