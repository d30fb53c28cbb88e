//! # Unit Executors
//!
//! Runs the steps of one unit against a storage backend. The engine decides
//! which units run and in which order; an executor only runs what it is given.

use chrono::Utc;
use serde_json::json;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::directive::Direction;
use super::errors::{MigrationError, MigrationResult};
use super::{MigrationUnit, MigrationVersion};

/// Executes a unit's `up` or `down` steps
pub trait UnitExecutor {
    fn execute(&self, unit: &MigrationUnit, direction: Direction) -> MigrationResult<()>;
}

/// Journal file name inside a target's data directory
pub const JOURNAL_FILE: &str = "schema_journal.jsonl";

/// Appends every executed step to a JSON-lines journal in the data directory
#[derive(Debug, Clone)]
pub struct JournalExecutor {
    journal_file: PathBuf,
}

impl JournalExecutor {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            journal_file: data_dir.as_ref().join(JOURNAL_FILE),
        }
    }

    pub fn journal_file(&self) -> &Path {
        &self.journal_file
    }
}

impl UnitExecutor for JournalExecutor {
    fn execute(&self, unit: &MigrationUnit, direction: Direction) -> MigrationResult<()> {
        let steps = match direction {
            Direction::Up => &unit.up,
            Direction::Down => &unit.down,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_file)
            .map_err(|e| MigrationError::Internal {
                message: format!("Failed to open {:?}: {}", self.journal_file, e),
            })?;

        for (i, step) in steps.iter().enumerate() {
            let line = json!({
                "version": unit.version,
                "name": unit.name,
                "direction": direction,
                "step": i,
                "operation": step,
                "at": Utc::now(),
            });
            writeln!(file, "{}", line).map_err(|e| MigrationError::Internal {
                message: format!("step {} could not be journaled: {}", i, e),
            })?;
        }

        Ok(())
    }
}

/// In-memory executor for tests and dry wiring
///
/// Fails any unit registered with [`InMemoryExecutor::fail_on`].
#[derive(Debug, Default)]
pub struct InMemoryExecutor {
    failures: BTreeMap<MigrationVersion, String>,
    executed: RefCell<Vec<(MigrationVersion, Direction)>>,
}

impl InMemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(mut self, version: MigrationVersion, cause: impl Into<String>) -> Self {
        self.failures.insert(version, cause.into());
        self
    }

    /// Units executed so far, in order
    pub fn executed(&self) -> Vec<(MigrationVersion, Direction)> {
        self.executed.borrow().clone()
    }
}

impl UnitExecutor for InMemoryExecutor {
    fn execute(&self, unit: &MigrationUnit, direction: Direction) -> MigrationResult<()> {
        self.executed.borrow_mut().push((unit.version, direction));

        match self.failures.get(&unit.version) {
            Some(cause) => Err(MigrationError::Internal {
                message: cause.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl<T: UnitExecutor + ?Sized> UnitExecutor for &T {
    fn execute(&self, unit: &MigrationUnit, direction: Direction) -> MigrationResult<()> {
        (**self).execute(unit, direction)
    }
}
