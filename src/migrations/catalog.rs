//! # Migration Catalog
//!
//! The deduplicated, version-ordered set of units for one run.
//! Built once from loader output and read-only afterwards.

use super::errors::{MigrationError, MigrationResult};
use super::{MigrationUnit, MigrationVersion};

/// Sorted, duplicate-free sequence of migration units
#[derive(Debug, Clone, Default)]
pub struct MigrationCatalog {
    units: Vec<MigrationUnit>,
}

impl MigrationCatalog {
    /// Build a catalog from loader output
    ///
    /// Input order is insignificant; units are always re-sorted by version.
    pub fn build(units: impl IntoIterator<Item = MigrationUnit>) -> MigrationResult<Self> {
        let mut units: Vec<MigrationUnit> = units.into_iter().collect();
        units.sort_by_key(|u| u.version);

        if let Some(pair) = units.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(MigrationError::DuplicateVersion {
                version: pair[0].version,
            });
        }

        Ok(Self { units })
    }

    /// All units in ascending version order
    pub fn all(&self) -> &[MigrationUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Position of `version` in the ordered sequence
    pub fn index_of(&self, version: MigrationVersion) -> Option<usize> {
        self.units.binary_search_by_key(&version, |u| u.version).ok()
    }

    pub fn get(&self, version: MigrationVersion) -> Option<&MigrationUnit> {
        self.index_of(version).map(|i| &self.units[i])
    }

    /// Version of the lowest unit carrying `tag`
    pub fn resolve_tag(&self, tag: &str) -> Option<MigrationVersion> {
        self.units
            .iter()
            .find(|u| u.tag.as_deref() == Some(tag))
            .map(|u| u.version)
    }

    /// Newest unit, if any
    pub fn latest(&self) -> Option<&MigrationUnit> {
        self.units.last()
    }
}
