//! Mapper configuration
//!
//! Settings are plain serde structs so they can be embedded in whatever
//! configuration file the host application already loads; a JSON loader is
//! provided for standalone use.

use super::error::{DatabaseError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default timeout for database operations (30 seconds)
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

fn default_operation_timeout_ms() -> u64 {
    DEFAULT_OPERATION_TIMEOUT.as_millis() as u64
}

/// Configuration for an [`Orm`](crate::orm::Orm)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrmConfig {
    /// Data source handed to the backend (file path, `mysql://` URL, ...)
    pub data_source: String,
    /// Timeout for a single database operation, in milliseconds
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    /// Log every executed statement with its values inlined, at info level
    #[serde(default)]
    pub log_statements: bool,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            data_source: String::new(),
            operation_timeout_ms: default_operation_timeout_ms(),
            log_statements: false,
        }
    }
}

impl OrmConfig {
    /// Create a configuration for `data_source` with default settings
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            ..Default::default()
        }
    }

    /// Set the database operation timeout
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Enable or disable literal statement logging
    pub fn with_statement_logging(mut self, enabled: bool) -> Self {
        self.log_statements = enabled;
        self
    }

    /// Operation timeout as a [`Duration`]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Parse a JSON document
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON or an invalid configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check the settings are usable
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Config`] for an empty data source or a zero
    /// timeout.
    pub fn validate(&self) -> Result<()> {
        if self.data_source.trim().is_empty() {
            return Err(DatabaseError::config("data_source must not be empty"));
        }
        if self.operation_timeout_ms == 0 {
            return Err(DatabaseError::config("operation_timeout_ms must be positive"));
        }
        Ok(())
    }
}
