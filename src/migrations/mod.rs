//! # Schema Migrations
//!
//! Resolves where a target store's schema should end up and drives the
//! ordered application of versioned migration units to get it there.
//!
//! # Run Pipeline
//!
//! 1. **Load**: a [`UnitLoader`] yields migration units
//! 2. **Catalog**: units are deduplicated and sorted by version
//! 3. **Read state**: the [`AppliedStateReader`] reports the last applied version
//! 4. **Resolve**: the directive becomes a concrete target or a no-op
//! 5. **Apply**: the [`ApplyDriver`] hands the target to the [`MigrationEngine`]
//!
//! Resolution fails before anything is applied. Apply stops at the first
//! failing unit and leaves everything before it applied; there is no
//! automatic rollback.
//!
//! # Unit Manifest Format
//!
//! ```yaml
//! version: 3
//! name: add_orders
//! tag: release-a
//! group: billing
//! checksum: crc32:ABC12345
//! up:
//!   - create_collection: orders
//! down:
//!   - drop_collection: orders
//! ```

pub mod catalog;
pub mod checksum;
pub mod directive;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod loader;
pub mod migrator;
pub mod resolver;
pub mod state;

pub use catalog::MigrationCatalog;
pub use directive::{Direction, DirectiveParser, DirectivePolicy, TargetDirective};
pub use driver::{ApplyDriver, ApplyReport};
pub use engine::{EngineReport, LedgerEngine, MigrationEngine};
pub use executor::{InMemoryExecutor, JournalExecutor, UnitExecutor};
pub use errors::{MigrationError, MigrationResult};
pub use loader::{ManifestLoader, StaticLoader, UnitLoader};
pub use migrator::Migrator;
pub use resolver::{Resolution, ResolutionOutcome, ResolverOptions, StartPosition};
pub use state::{AppliedState, AppliedStateReader, LedgerStore};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Migration version number
pub type MigrationVersion = u64;

/// A single versioned migration unit
///
/// `version` is the only identity: it orders the catalog and must be unique
/// within it. `tag` and `group` are labels; only `tag` is addressable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationUnit {
    pub version: MigrationVersion,

    /// Human-readable name (from manifest or filename)
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub tag: Option<String>,

    #[serde(default)]
    pub group: Option<String>,

    /// CRC32 of the manifest, `crc32:XXXXXXXX`
    #[serde(default)]
    pub checksum: Option<String>,

    /// Steps run when migrating up, passed to the executor as-is
    #[serde(default)]
    pub up: Vec<serde_json::Value>,

    /// Steps run when reverting
    #[serde(default)]
    pub down: Vec<serde_json::Value>,

    #[serde(skip)]
    pub file_path: Option<PathBuf>,
}

impl MigrationUnit {
    pub fn new(version: MigrationVersion) -> Self {
        Self {
            version,
            name: format!("migration_{}", version),
            tag: None,
            group: None,
            checksum: None,
            up: Vec::new(),
            down: Vec::new(),
            file_path: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_up(mut self, step: serde_json::Value) -> Self {
        self.up.push(step);
        self
    }

    pub fn with_down(mut self, step: serde_json::Value) -> Self {
        self.down.push(step);
        self
    }

    /// Validate unit structure
    pub fn validate(&self) -> MigrationResult<()> {
        // 0 means "nothing applied" in the ledger
        if self.version == 0 {
            return Err(MigrationError::InvalidMigration {
                reason: format!("'{}': version must be >= 1", self.name),
            });
        }

        if let Some(tag) = &self.tag {
            if tag.trim().is_empty() {
                return Err(MigrationError::InvalidMigration {
                    reason: format!("'{}': tag must not be blank", self.name),
                });
            }
        }

        Ok(())
    }
}
