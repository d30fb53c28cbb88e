//! # Migration Errors
//!
//! Every failure a run can hit, from catalog construction through apply.
//!
//! Resolution-time errors (`DuplicateVersion`, `UnknownTag`, `EmptyCatalog`,
//! `StoreUnavailable`, directive errors) are raised before any unit runs.
//! `EngineFailure` is the only error produced after the store was touched.

use std::fmt;
use std::io;
use std::path::PathBuf;

use super::MigrationVersion;

/// Result type for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Migration error types
#[derive(Debug)]
pub enum MigrationError {
    /// Two units in one catalog share a version
    DuplicateVersion { version: MigrationVersion },

    /// Requested tag has no matching unit
    UnknownTag { tag: String },

    /// Relative stepping requested against an empty catalog
    EmptyCatalog,

    /// Applied state could not be read from the target store
    StoreUnavailable { reason: String },

    /// A unit failed while the engine was applying it
    ///
    /// Units applied before this one stay applied.
    EngineFailure {
        version: MigrationVersion,
        name: String,
        cause: String,
    },

    /// Directive token could not be parsed
    InvalidDirective { token: String, reason: String },

    /// More than one addressing directive was supplied
    ConflictingDirective { first: String, second: String },

    /// Applied version is not present in the catalog
    DriftedState { version: MigrationVersion },

    /// Engine was asked for a version the catalog does not contain
    MigrationNotFound { version: MigrationVersion },

    /// Manifest content does not match its recorded checksum
    ChecksumMismatch {
        migration: String,
        expected: String,
        actual: String,
    },

    /// Migration file could not be read
    FileRead { path: PathBuf, source: io::Error },

    /// Migration file failed YAML parsing
    ParseError { path: PathBuf, message: String },

    /// Migration unit is structurally invalid
    InvalidMigration { reason: String },

    /// Migrations directory does not exist
    DirectoryNotFound { path: PathBuf },

    /// Ledger could not be written
    StateError { message: String },

    /// Generic internal error
    Internal { message: String },
}

impl MigrationError {
    /// Whether the error was raised before any unit was applied
    pub fn is_resolution_error(&self) -> bool {
        !matches!(self, Self::EngineFailure { .. } | Self::StateError { .. })
    }
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateVersion { version } => {
                write!(f, "Migration version {} is defined more than once", version)
            }
            Self::UnknownTag { tag } => write!(f, "\"{}\" is not a valid tag", tag),
            Self::EmptyCatalog => {
                write!(f, "Cannot step through migrations: no migrations were found")
            }
            Self::StoreUnavailable { reason } => {
                write!(f, "Could not gather version info from target store: {}", reason)
            }
            Self::EngineFailure {
                version,
                name,
                cause,
            } => {
                write!(f, "Migration {} ({}) failed: {}", version, name, cause)
            }
            Self::InvalidDirective { token, reason } => {
                write!(f, "Invalid argument \"{}\": {}", token, reason)
            }
            Self::ConflictingDirective { first, second } => {
                write!(
                    f,
                    "Conflicting directives \"{}\" and \"{}\": supply exactly one of to, tag, up or down",
                    first, second
                )
            }
            Self::DriftedState { version } => {
                write!(
                    f,
                    "Applied version {} is not present in the migration catalog",
                    version
                )
            }
            Self::MigrationNotFound { version } => {
                write!(f, "Migration version {} not found", version)
            }
            Self::ChecksumMismatch {
                migration,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Checksum mismatch for migration '{}': expected {}, got {}. \
                     Migration file may have been manually modified.",
                    migration, expected, actual
                )
            }
            Self::FileRead { path, source } => {
                write!(f, "Failed to read migration file {:?}: {}", path, source)
            }
            Self::ParseError { path, message } => {
                write!(f, "Failed to parse migration {:?}: {}", path, message)
            }
            Self::InvalidMigration { reason } => write!(f, "Invalid migration: {}", reason),
            Self::DirectoryNotFound { path } => {
                write!(f, "Migration directory not found: {:?}", path)
            }
            Self::StateError { message } => write!(f, "Migration ledger error: {}", message),
            Self::Internal { message } => write!(f, "Internal migration error: {}", message),
        }
    }
}

impl std::error::Error for MigrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::FileRead { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for MigrationError {
    fn from(err: io::Error) -> Self {
        Self::Internal {
            message: err.to_string(),
        }
    }
}
