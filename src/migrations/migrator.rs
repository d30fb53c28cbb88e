//! # Migrator
//!
//! One run end to end: load units, build the catalog, read applied state,
//! resolve the directive, apply. Catalog and state are rebuilt on every call.

use serde::Serialize;
use tracing::info;

use super::catalog::MigrationCatalog;
use super::directive::TargetDirective;
use super::driver::{ApplyDriver, ApplyReport};
use super::engine::MigrationEngine;
use super::errors::MigrationResult;
use super::loader::UnitLoader;
use super::resolver::ResolverOptions;
use super::state::AppliedStateReader;
use super::MigrationVersion;
use crate::observability::TraceSink;

/// A catalog entry as shown by `status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitStatus {
    pub version: MigrationVersion,
    pub name: String,
    pub tag: Option<String>,
    pub group: Option<String>,
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub current_version: MigrationVersion,
    pub latest_version: Option<MigrationVersion>,
    pub total_migrations: usize,
    pub pending_count: usize,
    /// Applied version is not in the catalog
    pub drifted: bool,
    pub units: Vec<UnitStatus>,
}

pub struct Migrator<L, R, E, S> {
    loader: L,
    reader: R,
    driver: ApplyDriver<E, S>,
}

impl<L, R, E, S> Migrator<L, R, E, S>
where
    L: UnitLoader,
    R: AppliedStateReader,
    E: MigrationEngine,
    S: TraceSink,
{
    pub fn new(loader: L, reader: R, engine: E, sink: S) -> Self {
        Self {
            loader,
            reader,
            driver: ApplyDriver::new(engine, sink),
        }
    }

    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.driver = self.driver.with_options(options);
        self
    }

    pub fn driver(&self) -> &ApplyDriver<E, S> {
        &self.driver
    }

    fn catalog(&self) -> MigrationResult<MigrationCatalog> {
        MigrationCatalog::build(self.loader.list_units()?)
    }

    /// Run one migration pass toward `directive`
    ///
    /// Resolution errors return before the engine is touched. A failing unit
    /// comes back inside the report; use [`ApplyReport::into_result`] to turn
    /// it into an error.
    pub fn run(&mut self, directive: &TargetDirective) -> MigrationResult<ApplyReport> {
        let catalog = self.catalog()?;
        let current = self.reader.read_current()?;

        info!(
            directive = %directive,
            current_version = current.current_version,
            units = catalog.len(),
            "starting migration run"
        );

        let outcome = self.driver.resolve(directive, &catalog, &current)?;
        let report = self.driver.apply(&catalog, &current, outcome.resolution)?;

        info!(
            applied = report.applied.len(),
            failed = report.failed.is_some(),
            "migration run finished"
        );
        Ok(report)
    }

    /// Catalog against applied state, without running anything
    ///
    /// A unit is pending when the ledger has no record of it, so a unit
    /// authored below the newest applied one still shows up.
    pub fn status(&self) -> MigrationResult<StatusReport> {
        let catalog = self.catalog()?;
        let current = self.reader.read_current()?.current_version;
        let applied = self.reader.applied_versions()?;

        let drifted = current != 0 && catalog.index_of(current).is_none();

        let units: Vec<UnitStatus> = catalog
            .all()
            .iter()
            .map(|u| UnitStatus {
                version: u.version,
                name: u.name.clone(),
                tag: u.tag.clone(),
                group: u.group.clone(),
                pending: !applied.contains(&u.version),
            })
            .collect();

        Ok(StatusReport {
            current_version: current,
            latest_version: catalog.latest().map(|u| u.version),
            total_migrations: catalog.len(),
            pending_count: units.iter().filter(|u| u.pending).count(),
            drifted,
            units,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::errors::MigrationError;
    use crate::migrations::executor::InMemoryExecutor;
    use crate::migrations::{Direction, LedgerEngine, LedgerStore, MigrationUnit, StaticLoader};
    use crate::observability::{MemoryTraceSink, TraceEventKind};
    use tempfile::TempDir;

    fn loader(versions: &[u64]) -> StaticLoader {
        StaticLoader::new(versions.iter().map(|v| MigrationUnit::new(*v)).collect())
    }

    #[test]
    fn test_run_stops_on_failing_unit() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::new(temp_dir.path());
        let executor = InMemoryExecutor::new().fail_on(2, "constraint violated");
        let sink = MemoryTraceSink::default();
        let mut migrator = Migrator::new(
            loader(&[1, 2, 3]),
            store.clone(),
            LedgerEngine::new(store.clone(), &executor),
            &sink,
        );

        let report = migrator.run(&TargetDirective::Latest).unwrap();

        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.applied[0].version, 1);
        let failed = report.failed.clone().unwrap();
        assert_eq!(failed.version, 2);
        assert!(failed.cause.contains("constraint violated"));
        assert!(!executor.executed().contains(&(3, Direction::Up)));
        assert!(matches!(
            report.into_result(),
            Err(MigrationError::EngineFailure { version: 2, .. })
        ));
        assert_eq!(store.read_current().unwrap().current_version, 1);
        assert_eq!(sink.kinds().last(), Some(&TraceEventKind::ApplyFailed));
    }

    #[test]
    fn test_steps_through_catalog_across_runs() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::new(temp_dir.path());
        let executor = InMemoryExecutor::new();
        let mut migrator = Migrator::new(
            loader(&[1, 2, 3]),
            store.clone(),
            LedgerEngine::new(store.clone(), &executor),
            MemoryTraceSink::default(),
        );

        migrator.run(&TargetDirective::up(2)).unwrap();
        assert_eq!(store.read_current().unwrap().current_version, 2);

        migrator.run(&TargetDirective::up(1)).unwrap();
        assert_eq!(store.read_current().unwrap().current_version, 3);

        migrator.run(&TargetDirective::down(1)).unwrap();
        assert_eq!(store.read_current().unwrap().current_version, 2);

        let report = migrator.run(&TargetDirective::down(5)).unwrap();
        assert!(report.is_noop());
        assert_eq!(store.read_current().unwrap().current_version, 2);
    }

    #[test]
    fn test_duplicate_version_aborts_before_apply() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::new(temp_dir.path());
        let executor = InMemoryExecutor::new();
        let mut migrator = Migrator::new(
            loader(&[1, 2, 2]),
            store.clone(),
            LedgerEngine::new(store.clone(), &executor),
            MemoryTraceSink::default(),
        );

        let result = migrator.run(&TargetDirective::Latest);

        assert!(matches!(
            result,
            Err(MigrationError::DuplicateVersion { version: 2 })
        ));
        assert!(executor.executed().is_empty());
    }

    #[test]
    fn test_status() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::new(temp_dir.path());
        let executor = InMemoryExecutor::new();
        let mut migrator = Migrator::new(
            loader(&[1, 2, 3]),
            store.clone(),
            LedgerEngine::new(store.clone(), &executor),
            MemoryTraceSink::default(),
        );

        migrator.run(&TargetDirective::Absolute(2)).unwrap();
        let status = migrator.status().unwrap();

        assert_eq!(status.current_version, 2);
        assert_eq!(status.latest_version, Some(3));
        assert_eq!(status.pending_count, 1);
        assert!(!status.drifted);
    }

    #[test]
    fn test_status_with_unit_removed_from_catalog() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::new(temp_dir.path());
        for version in 1..=4 {
            store.record_applied(&MigrationUnit::new(version), 1).unwrap();
        }
        let migrator = Migrator::new(
            loader(&[1, 2, 3]),
            store.clone(),
            LedgerEngine::new(store.clone(), InMemoryExecutor::new()),
            MemoryTraceSink::default(),
        );

        let status = migrator.status().unwrap();

        assert!(status.drifted);
        assert_eq!(status.current_version, 4);
        assert_eq!(status.pending_count, 0);
        assert!(status.units.iter().all(|u| !u.pending));
    }

    #[test]
    fn test_status_with_unit_added_below_applied() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::new(temp_dir.path());
        store.record_applied(&MigrationUnit::new(1), 1).unwrap();
        store.record_applied(&MigrationUnit::new(3), 1).unwrap();
        let executor = InMemoryExecutor::new();
        let mut migrator = Migrator::new(
            loader(&[1, 2, 3]),
            store.clone(),
            LedgerEngine::new(store.clone(), &executor),
            MemoryTraceSink::default(),
        );

        let status = migrator.status().unwrap();

        assert_eq!(status.pending_count, 1);
        let pending: Vec<_> = status.units.iter().map(|u| (u.version, u.pending)).collect();
        assert_eq!(pending, vec![(1, false), (2, true), (3, false)]);

        migrator.run(&TargetDirective::Latest).unwrap();
        assert_eq!(executor.executed(), vec![(2, Direction::Up)]);
        assert_eq!(migrator.status().unwrap().pending_count, 0);
    }

    #[test]
    fn test_each_run_has_its_own_id() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::new(temp_dir.path());
        let sink = MemoryTraceSink::default();
        let mut migrator = Migrator::new(
            loader(&[1, 2, 3]),
            store.clone(),
            LedgerEngine::new(store.clone(), InMemoryExecutor::new()),
            &sink,
        );

        let first = migrator.run(&TargetDirective::up(1)).unwrap();
        let second = migrator.run(&TargetDirective::up(1)).unwrap();

        assert_ne!(first.run_id, second.run_id);
        let mut ids: Vec<_> = sink.events().iter().map(|e| e.run_id).collect();
        ids.dedup();
        assert_eq!(ids, vec![first.run_id, second.run_id]);
    }
}
