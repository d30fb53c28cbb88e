//! # Apply Driver
//!
//! Resolves a directive and hands the result to the engine, tracing every
//! decision to the run's sink.
//!
//! The apply loop is sequential and non-transactional: when a unit fails the
//! driver stops, reports the unit and its cause, and leaves every unit
//! applied before it in place.

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use super::catalog::MigrationCatalog;
use super::directive::TargetDirective;
use super::engine::{EngineStep, MigrationEngine, UnitFailure};
use super::errors::{MigrationError, MigrationResult};
use super::resolver::{self, Resolution, ResolutionOutcome, ResolverOptions, StartPosition};
use super::state::AppliedState;
use super::MigrationVersion;
use crate::observability::{TraceEvent, TraceEventKind, TraceOutcome, TraceSink};

/// Result of one apply pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub run_id: Uuid,
    pub starting_version: MigrationVersion,
    pub target: Resolution,
    pub applied: Vec<EngineStep>,
    pub failed: Option<UnitFailure>,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_none()
    }

    /// Nothing was run and nothing needed to be
    pub fn is_noop(&self) -> bool {
        self.is_success() && self.applied.is_empty()
    }

    /// Convert a failed report into `EngineFailure`
    pub fn into_result(self) -> MigrationResult<ApplyReport> {
        match &self.failed {
            Some(failure) => Err(MigrationError::EngineFailure {
                version: failure.version,
                name: failure.name.clone(),
                cause: failure.cause.clone(),
            }),
            None => Ok(self),
        }
    }
}

/// Identity of one run: a fresh id and the directive it was started for
#[derive(Debug, Clone)]
struct RunScope {
    id: Uuid,
    directive: String,
}

impl RunScope {
    fn new(directive: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            directive: directive.into(),
        }
    }

    /// Label for an `apply` that was not preceded by `resolve`
    fn for_resolution(target: Resolution) -> Self {
        match target {
            Resolution::Version(v) => Self::new(TargetDirective::Absolute(v).to_string()),
            Resolution::NoOp => Self::new("none"),
        }
    }

    fn event(&self, kind: TraceEventKind) -> TraceEvent {
        TraceEvent::new(self.id, kind, self.directive.clone())
    }
}

/// Drives runs against an engine, tracing to a sink
///
/// Each `resolve` opens a new run with its own id; the following `apply`
/// closes it. Nothing about a run outlives it.
pub struct ApplyDriver<E, S> {
    engine: E,
    sink: S,
    options: ResolverOptions,
    run: Option<RunScope>,
}

impl<E: MigrationEngine, S: TraceSink> ApplyDriver<E, S> {
    pub fn new(engine: E, sink: S) -> Self {
        Self {
            engine,
            sink,
            options: ResolverOptions::default(),
            run: None,
        }
    }

    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    /// Id of the run resolved but not yet applied
    pub fn run_id(&self) -> Option<Uuid> {
        self.run.as_ref().map(|r| r.id)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Sink failures are logged, never propagated
    fn emit(&self, event: TraceEvent) {
        if let Err(e) = self.sink.record(&event) {
            warn!(kind = event.kind.as_str(), error = %e, "trace sink rejected event");
        }
    }

    /// Resolve `directive` and trace the decision
    pub fn resolve(
        &mut self,
        directive: &TargetDirective,
        catalog: &MigrationCatalog,
        current: &AppliedState,
    ) -> MigrationResult<ResolutionOutcome> {
        let run = RunScope::new(directive.to_string());
        self.run = Some(run.clone());
        self.emit(
            run.event(TraceEventKind::DirectiveReceived)
                .detail(format!("current version {}", current.current_version)),
        );

        let outcome = match resolver::resolve(directive, catalog, current, self.options) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.emit(
                    run.event(TraceEventKind::VersionResolved)
                        .outcome(TraceOutcome::Failed)
                        .detail(e.to_string()),
                );
                self.run = None;
                return Err(e);
            }
        };

        if let Some(StartPosition::Drifted { version }) = outcome.start {
            warn!(
                version,
                "applied version is not in the catalog; stepping from before the first unit"
            );
            self.emit(
                run.event(TraceEventKind::DriftDetected)
                    .outcome(TraceOutcome::Warning)
                    .detail(format!("applied version {} is not in the catalog", version)),
            );
        }

        let traced = match outcome.resolution {
            Resolution::NoOp => TraceOutcome::NoOp,
            Resolution::Version(_) => TraceOutcome::Success,
        };
        self.emit(
            run.event(TraceEventKind::VersionResolved)
                .resolved(outcome.resolution)
                .outcome(traced),
        );

        Ok(outcome)
    }

    /// Hand `target` to the engine
    ///
    /// `Err` only when the engine could not run at all; a failing unit is
    /// returned in [`ApplyReport::failed`]. Closes the run opened by
    /// [`ApplyDriver::resolve`], or opens and closes a new one.
    pub fn apply(
        &mut self,
        catalog: &MigrationCatalog,
        current: &AppliedState,
        target: Resolution,
    ) -> MigrationResult<ApplyReport> {
        let run = self
            .run
            .take()
            .unwrap_or_else(|| RunScope::for_resolution(target));
        let mut report = ApplyReport {
            run_id: run.id,
            starting_version: current.current_version,
            target,
            applied: Vec::new(),
            failed: None,
        };

        let version = match target {
            Resolution::NoOp => {
                self.emit(
                    run.event(TraceEventKind::ApplyFinished)
                        .resolved(target)
                        .outcome(TraceOutcome::NoOp)
                        .detail("nothing to apply"),
                );
                return Ok(report);
            }
            Resolution::Version(v) => v,
        };

        self.emit(run.event(TraceEventKind::ApplyStarted).resolved(target));

        let engine_report = match self.engine.migrate_to(catalog, version) {
            Ok(r) => r,
            Err(e) => {
                self.emit(
                    run.event(TraceEventKind::ApplyFailed)
                        .resolved(target)
                        .outcome(TraceOutcome::Failed)
                        .detail(e.to_string()),
                );
                return Err(e);
            }
        };

        report.applied = engine_report.steps;
        report.failed = engine_report.failure;

        match &report.failed {
            Some(failure) => self.emit(
                run.event(TraceEventKind::ApplyFailed)
                    .resolved(target)
                    .outcome(TraceOutcome::Failed)
                    .detail(format!(
                        "migration {} ({}) failed after {} unit(s): {}",
                        failure.version,
                        failure.name,
                        report.applied.len(),
                        failure.cause
                    )),
            ),
            None => self.emit(
                run.event(TraceEventKind::ApplyFinished)
                    .resolved(target)
                    .outcome(TraceOutcome::Success)
                    .detail(format!("{} unit(s) run", report.applied.len())),
            ),
        }

        Ok(report)
    }
}
