//! Configuration types and loading.
//!
//! The main entry point is [`MatrixConfig`]. It is loaded with
//! [`load_config`] and saved with [`save_config`]; the file format is picked
//! from the extension.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file contained invalid YAML.
    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The configuration file contained invalid TOML.
    #[error("failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// The configuration could not be written as TOML.
    #[error("failed to write TOML config: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    /// The configuration file contained invalid JSON.
    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// A configuration value was invalid.
    #[error("invalid configuration value for key '{key}': {reason}")]
    InvalidValue {
        /// The configuration key that had an invalid value.
        key: String,
        /// A description of why the value is invalid.
        reason: String,
    },
}

/// A specialized `Result` type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// MatrixConfig
// ---------------------------------------------------------------------------

/// Naming and layout options for the columns the adapter creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MatrixConfig {
    /// Name of the constant intercept column.
    #[serde(default = "default_intercept_name")]
    pub intercept_name: String,

    /// Label given to the response while it is evaluated.
    #[serde(default = "default_response_name")]
    pub response_name: String,

    /// Prefix for predictors that cannot report a name; the 1-based
    /// predictor position is appended.
    #[serde(default = "default_fallback_prefix")]
    pub fallback_prefix: String,

    /// Rewrite design-matrix column names to lowercase snake case
    /// (`x1:x2` becomes `x1_x2`).
    #[serde(default)]
    pub clean_names: bool,

    /// Whether an intercept column may be added at all. When `false` the
    /// design matrix never has one, even if the formula asks for it.
    #[serde(default = "default_intercept")]
    pub intercept: bool,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            intercept_name: default_intercept_name(),
            response_name: default_response_name(),
            fallback_prefix: default_fallback_prefix(),
            clean_names: false,
            intercept: default_intercept(),
        }
    }
}

fn default_intercept_name() -> String {
    "Intercept".to_string()
}

fn default_response_name() -> String {
    "__y__".to_string()
}

fn default_fallback_prefix() -> String {
    "x".to_string()
}

fn default_intercept() -> bool {
    true
}

impl MatrixConfig {
    /// Name for the predictor at 1-based `position` when it has no name of
    /// its own. Numbering ignores the intercept column.
    pub fn fallback_name(&self, position: usize) -> String {
        format!("{}{}", self.fallback_prefix, position)
    }

    /// Check that every name is usable as a column name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first empty name.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("intercept-name", &self.intercept_name),
            ("response-name", &self.response_name),
            ("fallback-prefix", &self.fallback_prefix),
        ];
        for (key, value) in fields {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Loading and saving
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Toml,
    Json,
}

fn format_of(path: &Path) -> Format {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Format::Toml,
        Some("json") => Format::Json,
        _ => Format::Yaml,
    }
}

/// Load configuration from `path`.
///
/// A missing or empty file yields [`MatrixConfig::default`]. Keys that are
/// absent from the file take their default values.
///
/// # Errors
///
/// Returns an I/O or format error if the file cannot be read or parsed, and
/// [`ConfigError::InvalidValue`] if a name is empty.
pub fn load_config(path: &Path) -> Result<MatrixConfig> {
    if !path.exists() {
        return Ok(MatrixConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(MatrixConfig::default());
    }

    let config: MatrixConfig = match format_of(path) {
        Format::Yaml => serde_yaml::from_str(&content)?,
        Format::Toml => toml::from_str(&content)?,
        Format::Json => serde_json::from_str(&content)?,
    };
    config.validate()?;
    Ok(config)
}

/// Save configuration to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns an I/O or serialization error on failure.
pub fn save_config(path: &Path, config: &MatrixConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = match format_of(path) {
        Format::Yaml => serde_yaml::to_string(config)?,
        Format::Toml => toml::to_string(config)?,
        Format::Json => serde_json::to_string_pretty(config)?,
    };
    std::fs::write(path, content)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
