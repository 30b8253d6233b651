//! Configuration specification types.
//!
//! This module defines the structs that map to the `vantage.yaml` file.
//! The file declares the desired state; the password is never part of it.

use serde::{Deserialize, Serialize};

use crate::resource::{AttributeSet, compute_profile};

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VantageConfig {
    /// Connection to the Query Service.
    pub connection: ConnectionConfig,
    /// State backend configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Resources to manage, in apply order.
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

/// Query Service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Base URL of the Query Service (e.g. `https://host:1443`).
    pub base_url: String,
    /// System name registered with the Query Service.
    pub system: String,
    /// Database user.
    pub user: String,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    /// Upper bound for one command, retries included, in seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

/// State backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StateConfig {
    /// Backend type.
    #[serde(default)]
    pub backend: StateBackend,
    /// S3 bucket name (required for s3 backend).
    #[serde(default)]
    pub bucket: Option<String>,
    /// S3 key prefix (optional).
    #[serde(default)]
    pub prefix: Option<String>,
    /// S3 region (optional, uses AWS default if not specified).
    #[serde(default)]
    pub region: Option<String>,
    /// Local state directory (for local backend).
    #[serde(default)]
    pub path: Option<String>,
}

/// State backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// Local file-based state storage.
    #[default]
    Local,
    /// AWS S3-based state storage.
    S3,
    /// Process memory; nothing survives the run.
    Memory,
}

/// One managed resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceConfig {
    /// Unique name of the resource within this file.
    pub name: String,
    /// Resource type.
    #[serde(rename = "type", default = "default_resource_type")]
    pub resource_type: String,
    /// Desired attributes.
    #[serde(default)]
    pub attributes: AttributeSet,
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_command_timeout() -> u64 {
    240
}

fn default_resource_type() -> String {
    String::from(compute_profile::RESOURCE_TYPE)
}

impl std::fmt::Display for StateBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Local => "local",
            Self::S3 => "s3",
            Self::Memory => "memory",
        };
        write!(f, "{s}")
    }
}

impl VantageConfig {
    /// Finds a resource by name.
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.name == name)
    }
}
