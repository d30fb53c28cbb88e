//! End-to-end runs over a manifest directory

use std::fs;
use std::path::Path;

use aeromigrate::migrations::{
    AppliedStateReader, Direction, DirectiveParser, DirectivePolicy, InMemoryExecutor,
    LedgerEngine, LedgerStore, ManifestLoader, MigrationError, Migrator, Resolution,
    ResolverOptions, TargetDirective,
};
use aeromigrate::observability::{FileTraceSink, MemoryTraceSink, TraceEventKind};
use tempfile::TempDir;

fn write_units(dir: &Path, units: &[(u64, &str, Option<&str>)]) {
    fs::create_dir_all(dir).unwrap();
    for (version, name, tag) in units {
        let tag_line = tag.map(|t| format!("tag: {}\n", t)).unwrap_or_default();
        fs::write(
            dir.join(format!("{:03}_{}.yaml", version, name)),
            format!("version: {}\n{}up:\n  - create_collection: {}\n", version, tag_line, name),
        )
        .unwrap();
    }
}

#[test]
fn failing_unit_stops_the_run() {
    let temp_dir = TempDir::new().unwrap();
    let migrations = temp_dir.path().join("migrations");
    write_units(
        &migrations,
        &[(1, "users", None), (2, "orders", None), (3, "invoices", None)],
    );

    let store = LedgerStore::new(temp_dir.path().join("data"));
    let executor = InMemoryExecutor::new().fail_on(2, "orders already exists");
    let sink = MemoryTraceSink::default();
    let mut migrator = Migrator::new(
        ManifestLoader::new(&migrations).unwrap(),
        store.clone(),
        LedgerEngine::new(store.clone(), &executor),
        &sink,
    );

    let report = migrator.run(&TargetDirective::Latest).unwrap();

    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.applied[0].name, "users");
    assert_eq!(executor.executed(), vec![(1, Direction::Up), (2, Direction::Up)]);
    assert_eq!(store.read_current().unwrap().current_version, 1);

    match report.into_result() {
        Err(MigrationError::EngineFailure { version, name, cause }) => {
            assert_eq!(version, 2);
            assert_eq!(name, "orders");
            assert!(cause.contains("orders already exists"));
        }
        other => panic!("expected EngineFailure, got {:?}", other),
    }

    assert_eq!(
        sink.kinds(),
        vec![
            TraceEventKind::DirectiveReceived,
            TraceEventKind::VersionResolved,
            TraceEventKind::ApplyStarted,
            TraceEventKind::ApplyFailed,
        ]
    );
}

#[test]
fn tag_and_relative_steps_resolve_against_applied_state() {
    let temp_dir = TempDir::new().unwrap();
    let migrations = temp_dir.path().join("migrations");
    write_units(
        &migrations,
        &[
            (10, "users", None),
            (20, "orders", Some("release-a")),
            (30, "invoices", None),
        ],
    );

    let store = LedgerStore::new(temp_dir.path().join("data"));
    let executor = InMemoryExecutor::new();
    let trace = FileTraceSink::create(temp_dir.path().join("run.log")).unwrap();
    let mut migrator = Migrator::new(
        ManifestLoader::new(&migrations).unwrap(),
        store.clone(),
        LedgerEngine::new(store.clone(), &executor),
        &trace,
    )
    .with_options(ResolverOptions::default());

    let parser = DirectiveParser::new(DirectivePolicy::LastWins);
    let directive = parser.parse(&["up:1", "tag:release-a"]).unwrap();

    let report = migrator.run(&directive).unwrap();
    assert_eq!(report.target, Resolution::Version(20));
    assert_eq!(store.read_current().unwrap().current_version, 20);

    let report = migrator.run(&TargetDirective::up(5)).unwrap();
    assert_eq!(report.target, Resolution::Version(30));

    let report = migrator.run(&TargetDirective::down(3)).unwrap();
    assert!(report.is_noop());
    assert_eq!(store.read_current().unwrap().current_version, 30);

    let log = fs::read_to_string(trace.path()).unwrap();
    assert!(log.lines().count() >= 9);
    assert!(log.contains("tag:release-a"));
}

#[test]
fn unknown_tag_fails_before_anything_runs() {
    let temp_dir = TempDir::new().unwrap();
    let migrations = temp_dir.path().join("migrations");
    write_units(&migrations, &[(1, "users", None)]);

    let store = LedgerStore::new(temp_dir.path().join("data"));
    let executor = InMemoryExecutor::new();
    let mut migrator = Migrator::new(
        ManifestLoader::new(&migrations).unwrap(),
        store.clone(),
        LedgerEngine::new(store.clone(), &executor),
        MemoryTraceSink::default(),
    );

    let result = migrator.run(&TargetDirective::Tag("missing".to_string()));

    assert!(matches!(result, Err(MigrationError::UnknownTag { ref tag }) if tag == "missing"));
    assert!(executor.executed().is_empty());
    assert!(!store.exists());
}
