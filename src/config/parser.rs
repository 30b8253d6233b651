//! Configuration parser for loading configuration files.
//!
//! This module handles loading configuration from YAML files, `.env` files
//! and `VANTAGE_*` environment variables, with environment taking precedence.

use crate::error::{ConfigError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::VantageConfig;

/// Environment variable holding the database password.
pub const PASSWORD_ENV: &str = "VANTAGE_PASSWORD";

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["vantage.yaml", "vantage.yml"];

/// Configuration parser for loading the desired state.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving the `.env` file.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<VantageConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<VantageConfig> {
        debug!("Parsing YAML configuration");

        let config: VantageConfig = serde_yaml::from_str(content).map_err(|e| {
            ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            }
        })?;

        debug!(
            "Parsed configuration for system {} with {} resources",
            config.connection.system,
            config.resources.len()
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Recognized variables: `VANTAGE_BASE_URL`, `VANTAGE_SYSTEM`,
    /// `VANTAGE_USER`, `VANTAGE_STATE_BUCKET` and `VANTAGE_STATE_PREFIX`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<VantageConfig> {
        let mut config = self.load_file(path)?;
        apply_overrides(&mut config, |name| std::env::var(name).ok());
        Ok(config)
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Gets the database password from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `VANTAGE_PASSWORD` is not set.
    pub fn get_password() -> Result<String> {
        std::env::var(PASSWORD_ENV).map_err(|_| {
            ConfigError::MissingEnvVar {
                name: String::from(PASSWORD_ENV),
            }
            .into()
        })
    }
}

/// Applies `VANTAGE_*` overrides read through `lookup`.
fn apply_overrides(config: &mut VantageConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(base_url) = lookup("VANTAGE_BASE_URL") {
        debug!("Overriding connection.base_url from environment");
        config.connection.base_url = base_url;
    }

    if let Some(system) = lookup("VANTAGE_SYSTEM") {
        debug!("Overriding connection.system from environment");
        config.connection.system = system;
    }

    if let Some(user) = lookup("VANTAGE_USER") {
        debug!("Overriding connection.user from environment");
        config.connection.user = user;
    }

    // State overrides
    if let Some(bucket) = lookup("VANTAGE_STATE_BUCKET") {
        debug!("Overriding state.bucket from environment");
        config.state.bucket = Some(bucket);
    }

    if let Some(prefix) = lookup("VANTAGE_STATE_PREFIX") {
        debug!("Overriding state.prefix from environment");
        config.state.prefix = Some(prefix);
    }
}

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }
    .into())
}
