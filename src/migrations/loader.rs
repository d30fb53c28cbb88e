//! # Unit Loaders
//!
//! Discovery of migration units. The catalog only ever sees the units a
//! loader yields; how they were found is the loader's business.

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::checksum::{manifest_checksum, verify_manifest};
use super::errors::{MigrationError, MigrationResult};
use super::MigrationUnit;

/// Yields the migration units available for a run
pub trait UnitLoader {
    fn list_units(&self) -> MigrationResult<Vec<MigrationUnit>>;
}

/// Loads `<version>_<name>.yaml` manifests from a directory
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    migrations_dir: PathBuf,
    pattern: Regex,
}

impl ManifestLoader {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> MigrationResult<Self> {
        let pattern = Regex::new(r"^(\d+)_(.+)\.ya?ml$").map_err(|e| MigrationError::Internal {
            message: e.to_string(),
        })?;

        Ok(Self {
            migrations_dir: migrations_dir.into(),
            pattern,
        })
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    fn load_manifest(
        &self,
        path: &Path,
        file_version: u64,
        file_name: &str,
    ) -> MigrationResult<MigrationUnit> {
        let content = fs::read_to_string(path).map_err(|e| MigrationError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut unit: MigrationUnit =
            serde_yaml::from_str(&content).map_err(|e| MigrationError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        if unit.version != file_version {
            return Err(MigrationError::InvalidMigration {
                reason: format!(
                    "{:?} declares version {} but its file name says {}",
                    path, unit.version, file_version
                ),
            });
        }

        if unit.name.is_empty() {
            unit.name = file_name.to_string();
        }

        if let Some(recorded) = &unit.checksum {
            if !verify_manifest(&content, recorded) {
                return Err(MigrationError::ChecksumMismatch {
                    migration: unit.name.clone(),
                    expected: recorded.clone(),
                    actual: manifest_checksum(&content),
                });
            }
        }

        unit.file_path = Some(path.to_path_buf());
        unit.validate()?;
        Ok(unit)
    }
}

impl UnitLoader for ManifestLoader {
    fn list_units(&self) -> MigrationResult<Vec<MigrationUnit>> {
        if !self.migrations_dir.is_dir() {
            return Err(MigrationError::DirectoryNotFound {
                path: self.migrations_dir.clone(),
            });
        }

        let read_err = |e| MigrationError::FileRead {
            path: self.migrations_dir.clone(),
            source: e,
        };

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.migrations_dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut units = Vec::new();
        for path in paths {
            let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let Some(caps) = self.pattern.captures(file_name) else {
                debug!(path = ?path, "skipping file without a migration name");
                continue;
            };

            let version = caps[1].parse::<u64>().map_err(|e| MigrationError::InvalidMigration {
                reason: format!("{:?}: {}", path, e),
            })?;
            units.push(self.load_manifest(&path, version, &caps[2])?);
        }

        debug!(count = units.len(), dir = ?self.migrations_dir, "loaded unit manifests");
        Ok(units)
    }
}

/// Compile-time registry of units
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    units: Vec<MigrationUnit>,
}

impl StaticLoader {
    pub fn new(units: Vec<MigrationUnit>) -> Self {
        Self { units }
    }

    pub fn register(mut self, unit: MigrationUnit) -> Self {
        self.units.push(unit);
        self
    }
}

impl UnitLoader for StaticLoader {
    fn list_units(&self) -> MigrationResult<Vec<MigrationUnit>> {
        for unit in &self.units {
            unit.validate()?;
        }
        Ok(self.units.clone())
    }
}
