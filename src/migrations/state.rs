//! # Applied-State Tracking
//!
//! Reads and records which units have been applied to a target store.
//!
//! The tracking structure is a JSON ledger (`_migration_ledger.json`) in the
//! target's data directory. A missing ledger is a fresh target, not an error.
//! Any other read failure is `StoreUnavailable` and is never retried.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::errors::{MigrationError, MigrationResult};
use super::{MigrationUnit, MigrationVersion};

/// Ledger file name inside a target's data directory
pub const LEDGER_FILE: &str = "_migration_ledger.json";

/// Applied-state snapshot, read once per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AppliedState {
    /// 0 when nothing has been applied
    pub current_version: MigrationVersion,
}

impl AppliedState {
    pub fn fresh() -> Self {
        Self::default()
    }

    pub fn is_fresh(&self) -> bool {
        self.current_version == 0
    }
}

/// Source of the target store's applied version
pub trait AppliedStateReader {
    fn read_current(&self) -> MigrationResult<AppliedState>;

    /// Every version recorded as applied, whether or not the catalog knows it
    fn applied_versions(&self) -> MigrationResult<BTreeSet<MigrationVersion>>;
}

/// Record of an applied unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub version: MigrationVersion,
    pub name: String,
    #[serde(default)]
    pub tag: Option<String>,
    /// Monotonic application order across the ledger's lifetime
    pub sequence: u64,
    pub applied_at: DateTime<Utc>,
    pub applied_by: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub next_sequence: u64,
    #[serde(default)]
    pub records: BTreeMap<MigrationVersion, LedgerRecord>,
}

impl Ledger {
    /// Most recently applied record
    ///
    /// Ordered by application recency, not by version magnitude.
    pub fn last_applied(&self) -> Option<&LedgerRecord> {
        self.records
            .values()
            .max_by_key(|r| (r.sequence, r.applied_at))
    }

    pub fn is_applied(&self, version: MigrationVersion) -> bool {
        self.records.contains_key(&version)
    }
}

/// File-backed tracking ledger for one target
#[derive(Debug, Clone)]
pub struct LedgerStore {
    ledger_file: PathBuf,
}

impl LedgerStore {
    /// Create a store over `data_dir`
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            ledger_file: data_dir.as_ref().join(LEDGER_FILE),
        }
    }

    pub fn ledger_file(&self) -> &Path {
        &self.ledger_file
    }

    /// Whether the tracking structure exists yet
    pub fn exists(&self) -> bool {
        self.ledger_file.exists()
    }

    /// Load the ledger; `None` when no tracking structure exists
    pub fn load(&self) -> MigrationResult<Option<Ledger>> {
        if !self.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.ledger_file).map_err(|e| {
            MigrationError::StoreUnavailable {
                reason: format!("{:?}: {}", self.ledger_file, e),
            }
        })?;

        let ledger: Ledger =
            serde_json::from_str(&content).map_err(|e| MigrationError::StoreUnavailable {
                reason: format!("{:?} is not a valid ledger: {}", self.ledger_file, e),
            })?;

        Ok(Some(ledger))
    }

    /// Atomic write: temp file, then rename
    fn save(&self, ledger: &Ledger) -> MigrationResult<()> {
        let content =
            serde_json::to_string_pretty(ledger).map_err(|e| MigrationError::StateError {
                message: format!("Failed to serialize ledger: {}", e),
            })?;

        if let Some(parent) = self.ledger_file.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MigrationError::StateError {
                message: format!("Failed to create {:?}: {}", parent, e),
            })?;
        }

        let temp_file = self.ledger_file.with_extension("json.tmp");
        std::fs::write(&temp_file, &content).map_err(|e| MigrationError::StateError {
            message: format!("Failed to write {:?}: {}", temp_file, e),
        })?;

        std::fs::rename(&temp_file, &self.ledger_file).map_err(|e| {
            MigrationError::StateError {
                message: format!("Failed to replace {:?}: {}", self.ledger_file, e),
            }
        })
    }

    /// Record a unit as applied
    pub fn record_applied(&self, unit: &MigrationUnit, duration_ms: u64) -> MigrationResult<()> {
        let mut ledger = self.load()?.unwrap_or_default();
        let sequence = ledger.next_sequence;
        ledger.next_sequence += 1;
        ledger.records.insert(
            unit.version,
            LedgerRecord {
                version: unit.version,
                name: unit.name.clone(),
                tag: unit.tag.clone(),
                sequence,
                applied_at: Utc::now(),
                applied_by: Some(whoami::username()),
                duration_ms,
            },
        );
        self.save(&ledger)?;
        debug!(version = unit.version, sequence, "recorded applied unit");
        Ok(())
    }

    /// Remove a reverted unit from the ledger
    pub fn record_reverted(&self, version: MigrationVersion) -> MigrationResult<()> {
        let mut ledger = self.load()?.unwrap_or_default();
        ledger.records.remove(&version);
        self.save(&ledger)?;
        debug!(version, "recorded reverted unit");
        Ok(())
    }
}

impl AppliedStateReader for LedgerStore {
    fn read_current(&self) -> MigrationResult<AppliedState> {
        let current_version = self
            .load()?
            .and_then(|ledger| ledger.last_applied().map(|r| r.version))
            .unwrap_or(0);

        Ok(AppliedState { current_version })
    }

    fn applied_versions(&self) -> MigrationResult<BTreeSet<MigrationVersion>> {
        Ok(self
            .load()?
            .map(|ledger| ledger.records.into_keys().collect())
            .unwrap_or_default())
    }
}
