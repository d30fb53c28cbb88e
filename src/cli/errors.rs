//! CLI error types
//!
//! Every error carries a stable code for the JSON error document and the
//! process exit code it maps to.

use std::fmt;

use crate::config::ConfigError;
use crate::migrations::MigrationError;

pub type CliResult<T> = Result<T, CliError>;

/// Exit code for a failed migration or resolution
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for usage and configuration errors
pub const EXIT_USAGE: i32 = 2;

#[derive(Debug)]
pub struct CliError {
    code: &'static str,
    message: String,
    exit_code: i32,
}

impl CliError {
    fn new(code: &'static str, message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            code,
            message: message.into(),
            exit_code,
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::new("CONFIG_ERROR", message, EXIT_USAGE)
    }

    pub fn invalid_target(target: &str) -> Self {
        Self::new(
            "INVALID_TARGET",
            format!("\"{}\" is not a valid target.", target),
            EXIT_USAGE,
        )
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new("INVALID_ARGUMENT", message, EXIT_USAGE)
    }

    pub fn resolution_failed(message: impl Into<String>) -> Self {
        Self::new("RESOLUTION_FAILED", message, EXIT_FAILURE)
    }

    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::new("STORE_UNAVAILABLE", message, EXIT_FAILURE)
    }

    pub fn migration_failed(message: impl Into<String>) -> Self {
        Self::new("MIGRATION_FAILED", message, EXIT_FAILURE)
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::new("IO_ERROR", message, EXIT_FAILURE)
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::config_error(err.to_string())
    }
}

impl From<MigrationError> for CliError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::InvalidDirective { .. }
            | MigrationError::ConflictingDirective { .. } => {
                Self::invalid_argument(err.to_string())
            }
            MigrationError::StoreUnavailable { .. } => Self::store_unavailable(err.to_string()),
            MigrationError::EngineFailure { .. }
            | MigrationError::MigrationNotFound { .. }
            | MigrationError::StateError { .. } => Self::migration_failed(err.to_string()),
            _ => Self::resolution_failed(err.to_string()),
        }
    }
}
