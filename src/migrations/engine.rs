//! # Migration Engine
//!
//! Moves a target store to a resolved version. Units above the target that
//! are applied get reverted newest-first; units at or below it that are not
//! applied get applied oldest-first.
//!
//! The engine stops at the first failing unit. It never rolls back units it
//! already applied in the same call.

use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};

use super::catalog::MigrationCatalog;
use super::directive::Direction;
use super::errors::{MigrationError, MigrationResult};
use super::executor::UnitExecutor;
use super::state::LedgerStore;
use super::{MigrationUnit, MigrationVersion};

/// A unit the engine ran successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStep {
    pub version: MigrationVersion,
    pub name: String,
    pub direction: Direction,
    pub duration_ms: u64,
}

/// The unit the engine stopped on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    pub version: MigrationVersion,
    pub name: String,
    pub direction: Direction,
    pub cause: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineReport {
    pub steps: Vec<EngineStep>,
    pub failure: Option<UnitFailure>,
}

/// Executes the units between the applied state and `target`
pub trait MigrationEngine {
    /// `Err` means the engine could not start or could not record progress;
    /// a failing unit is reported through [`EngineReport::failure`].
    fn migrate_to(
        &mut self,
        catalog: &MigrationCatalog,
        target: MigrationVersion,
    ) -> MigrationResult<EngineReport>;
}

/// Engine that tracks progress in a [`LedgerStore`]
pub struct LedgerEngine<E> {
    store: LedgerStore,
    executor: E,
}

impl<E: UnitExecutor> LedgerEngine<E> {
    pub fn new(store: LedgerStore, executor: E) -> Self {
        Self { store, executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    fn run_unit(
        &self,
        unit: &MigrationUnit,
        direction: Direction,
    ) -> Result<EngineStep, UnitFailure> {
        let start = Instant::now();
        let failure = |cause: String| UnitFailure {
            version: unit.version,
            name: unit.name.clone(),
            direction,
            cause,
        };

        self.executor
            .execute(unit, direction)
            .map_err(|e| failure(e.to_string()))?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let recorded = match direction {
            Direction::Up => self.store.record_applied(unit, duration_ms),
            Direction::Down => self.store.record_reverted(unit.version),
        };
        recorded.map_err(|e| failure(format!("unit ran but could not be recorded: {}", e)))?;

        Ok(EngineStep {
            version: unit.version,
            name: unit.name.clone(),
            direction,
            duration_ms,
        })
    }
}

impl<E: UnitExecutor> MigrationEngine for LedgerEngine<E> {
    fn migrate_to(
        &mut self,
        catalog: &MigrationCatalog,
        target: MigrationVersion,
    ) -> MigrationResult<EngineReport> {
        if target != 0 && catalog.index_of(target).is_none() {
            return Err(MigrationError::MigrationNotFound { version: target });
        }

        let ledger = self.store.load()?.unwrap_or_default();

        // Applied units the catalog no longer knows cannot be reverted.
        if let Some(orphan) = ledger
            .records
            .values()
            .rev()
            .find(|r| r.version > target && catalog.index_of(r.version).is_none())
        {
            return Err(MigrationError::MigrationNotFound {
                version: orphan.version,
            });
        }

        let to_revert = catalog
            .all()
            .iter()
            .rev()
            .filter(|u| u.version > target && ledger.is_applied(u.version));
        let to_apply = catalog
            .all()
            .iter()
            .filter(|u| u.version <= target && !ledger.is_applied(u.version));

        let plan: Vec<(&MigrationUnit, Direction)> = to_revert
            .map(|u| (u, Direction::Down))
            .chain(to_apply.map(|u| (u, Direction::Up)))
            .collect();
        debug!(target, units = plan.len(), "engine plan computed");

        let mut report = EngineReport::default();
        for (unit, direction) in plan {
            match self.run_unit(unit, direction) {
                Ok(step) => {
                    info!(
                        version = step.version,
                        direction = direction.as_str(),
                        duration_ms = step.duration_ms,
                        "unit complete"
                    );
                    report.steps.push(step);
                }
                Err(failure) => {
                    report.failure = Some(failure);
                    break;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::executor::InMemoryExecutor;
    use crate::migrations::state::AppliedStateReader;
    use tempfile::TempDir;

    fn catalog(versions: &[u64]) -> MigrationCatalog {
        MigrationCatalog::build(versions.iter().map(|v| MigrationUnit::new(*v))).unwrap()
    }

    #[test]
    fn test_applies_up_to_target() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::new(temp_dir.path());
        let mut engine = LedgerEngine::new(store.clone(), InMemoryExecutor::new());

        let report = engine.migrate_to(&catalog(&[1, 2, 3]), 2).unwrap();

        assert!(report.failure.is_none());
        let versions: Vec<_> = report.steps.iter().map(|s| s.version).collect();
        assert_eq!(versions, vec![1, 2]);
        assert_eq!(store.read_current().unwrap().current_version, 2);
    }

    #[test]
    fn test_reverts_down_to_target() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::new(temp_dir.path());
        let catalog = catalog(&[1, 2, 3]);
        let mut engine = LedgerEngine::new(store.clone(), InMemoryExecutor::new());

        engine.migrate_to(&catalog, 3).unwrap();
        let report = engine.migrate_to(&catalog, 1).unwrap();

        let steps: Vec<_> = report.steps.iter().map(|s| (s.version, s.direction)).collect();
        assert_eq!(steps, vec![(3, Direction::Down), (2, Direction::Down)]);
        assert_eq!(store.read_current().unwrap().current_version, 1);
    }

    #[test]
    fn test_zero_reverts_everything() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::new(temp_dir.path());
        let catalog = catalog(&[1, 2]);
        let mut engine = LedgerEngine::new(store.clone(), InMemoryExecutor::new());

        engine.migrate_to(&catalog, 2).unwrap();
        engine.migrate_to(&catalog, 0).unwrap();

        assert!(store.read_current().unwrap().is_fresh());
    }

    #[test]
    fn test_stops_at_first_failure() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::new(temp_dir.path());
        let executor = InMemoryExecutor::new().fail_on(2, "duplicate column");
        let mut engine = LedgerEngine::new(store.clone(), executor);

        let report = engine.migrate_to(&catalog(&[1, 2, 3]), 3).unwrap();

        assert_eq!(report.steps.len(), 1);
        let failure = report.failure.unwrap();
        assert_eq!(failure.version, 2);
        assert!(failure.cause.contains("duplicate column"));
        assert_eq!(
            engine.executor().executed(),
            vec![(1, Direction::Up), (2, Direction::Up)]
        );
        assert_eq!(store.read_current().unwrap().current_version, 1);
    }

    #[test]
    fn test_unknown_target_version() {
        let temp_dir = TempDir::new().unwrap();
        let mut engine =
            LedgerEngine::new(LedgerStore::new(temp_dir.path()), InMemoryExecutor::new());

        let result = engine.migrate_to(&catalog(&[1, 2]), 7);
        assert!(matches!(
            result,
            Err(MigrationError::MigrationNotFound { version: 7 })
        ));
    }
}
