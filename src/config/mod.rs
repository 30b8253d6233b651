//! Configuration module.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `vantage.yaml`
//! - `.env` loading and `VANTAGE_*` environment overrides
//! - Validation of configuration values
//! - Computing attribute fingerprints for change detection

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::AttributeHasher;
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, PASSWORD_ENV, find_config_file};
pub use spec::{ConnectionConfig, ResourceConfig, StateBackend, StateConfig, VantageConfig};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
