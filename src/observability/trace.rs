//! # Run Trace
//!
//! Structured, ordered events describing one migration run: the directive
//! received, the version it resolved to, and how the apply went.
//!
//! # Design Principles
//!
//! 1. **Scoped**: a sink belongs to one run and is handed to the driver
//! 2. **Append-only**: events are recorded, never modified
//! 3. **Non-fatal**: a sink that fails to deliver never aborts the run
//!
//! Sinks return [`SinkError`]; callers log it and move on.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use uuid::Uuid;

use crate::migrations::Resolution;

/// Kind of run event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventKind {
    DirectiveReceived,
    VersionResolved,
    DriftDetected,
    ApplyStarted,
    ApplyFinished,
    ApplyFailed,
}

impl TraceEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceEventKind::DirectiveReceived => "directive_received",
            TraceEventKind::VersionResolved => "version_resolved",
            TraceEventKind::DriftDetected => "drift_detected",
            TraceEventKind::ApplyStarted => "apply_started",
            TraceEventKind::ApplyFinished => "apply_finished",
            TraceEventKind::ApplyFailed => "apply_failed",
        }
    }
}

/// Outcome carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceOutcome {
    Pending,
    Success,
    NoOp,
    Warning,
    Failed,
}

/// A single run event
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: TraceEventKind,
    /// Directive summary, e.g. `up:2`
    pub directive: String,
    pub resolved: Option<Resolution>,
    pub outcome: TraceOutcome,
    pub detail: Option<String>,
}

impl TraceEvent {
    pub fn new(run_id: Uuid, kind: TraceEventKind, directive: impl Into<String>) -> Self {
        Self {
            run_id,
            timestamp: Utc::now(),
            kind,
            directive: directive.into(),
            resolved: None,
            outcome: TraceOutcome::Pending,
            detail: None,
        }
    }

    pub fn resolved(mut self, resolution: Resolution) -> Self {
        self.resolved = Some(resolution);
        self
    }

    pub fn outcome(mut self, outcome: TraceOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("trace sink I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("trace event could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("trace sink lock poisoned")]
    Poisoned,
}

/// Destination for run events
pub trait TraceSink {
    fn record(&self, event: &TraceEvent) -> Result<(), SinkError>;
}

/// Bounded in-memory sink, oldest events evicted first
#[derive(Debug)]
pub struct MemoryTraceSink {
    max_events: usize,
    events: RwLock<VecDeque<TraceEvent>>,
}

impl MemoryTraceSink {
    pub fn new(max_events: usize) -> Self {
        Self {
            max_events: max_events.max(1),
            events: RwLock::new(VecDeque::new()),
        }
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events
            .read()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<TraceEventKind> {
        self.events().iter().map(|e| e.kind).collect()
    }

    pub fn count(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }
}

impl Default for MemoryTraceSink {
    fn default() -> Self {
        Self::new(1_000)
    }
}

impl TraceSink for MemoryTraceSink {
    fn record(&self, event: &TraceEvent) -> Result<(), SinkError> {
        let mut events = self.events.write().map_err(|_| SinkError::Poisoned)?;
        while events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event.clone());
        Ok(())
    }
}

/// JSON-lines trace file, one per run
#[derive(Debug)]
pub struct FileTraceSink {
    path: PathBuf,
    file: RwLock<File>,
}

impl FileTraceSink {
    /// Create `<dir>/<YYYYMMDDhhmmss>.log`, replacing a file of the same name
    pub fn create_in(dir: impl AsRef<Path>) -> Result<Self, SinkError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.log", Utc::now().format("%Y%m%d%H%M%S")));
        Self::create(path)
    }

    pub fn create(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: RwLock::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TraceSink for FileTraceSink {
    fn record(&self, event: &TraceEvent) -> Result<(), SinkError> {
        let line = serde_json::to_string(event)?;
        let mut file = self.file.write().map_err(|_| SinkError::Poisoned)?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn record(&self, event: &TraceEvent) -> Result<(), SinkError> {
        let resolved = event.resolved.map(|r| match r {
            Resolution::Version(v) => v.to_string(),
            Resolution::NoOp => "noop".to_string(),
        });

        match event.outcome {
            TraceOutcome::Failed => tracing::error!(
                run_id = %event.run_id,
                kind = event.kind.as_str(),
                directive = %event.directive,
                resolved = ?resolved,
                detail = ?event.detail,
                "migration run event"
            ),
            TraceOutcome::Warning => tracing::warn!(
                run_id = %event.run_id,
                kind = event.kind.as_str(),
                directive = %event.directive,
                resolved = ?resolved,
                detail = ?event.detail,
                "migration run event"
            ),
            _ => tracing::info!(
                run_id = %event.run_id,
                kind = event.kind.as_str(),
                directive = %event.directive,
                resolved = ?resolved,
                "migration run event"
            ),
        }
        Ok(())
    }
}

/// Fans events out to several sinks
///
/// Every sink sees every event; the first error is returned.
#[derive(Default)]
pub struct CompositeSink {
    sinks: Vec<Box<dyn TraceSink>>,
}

impl CompositeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl TraceSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl TraceSink for CompositeSink {
    fn record(&self, event: &TraceEvent) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(event) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<T: TraceSink + ?Sized> TraceSink for &T {
    fn record(&self, event: &TraceEvent) -> Result<(), SinkError> {
        (**self).record(event)
    }
}

impl<T: TraceSink + ?Sized> TraceSink for std::sync::Arc<T> {
    fn record(&self, event: &TraceEvent) -> Result<(), SinkError> {
        (**self).record(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct BrokenSink;

    impl TraceSink for BrokenSink {
        fn record(&self, _event: &TraceEvent) -> Result<(), SinkError> {
            Err(SinkError::Poisoned)
        }
    }

    fn event(kind: TraceEventKind) -> TraceEvent {
        TraceEvent::new(Uuid::new_v4(), kind, "up:1")
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemoryTraceSink::default();
        sink.record(&event(TraceEventKind::DirectiveReceived)).unwrap();
        sink.record(&event(TraceEventKind::VersionResolved)).unwrap();

        assert_eq!(
            sink.kinds(),
            vec![
                TraceEventKind::DirectiveReceived,
                TraceEventKind::VersionResolved
            ]
        );
    }

    #[test]
    fn test_memory_sink_is_bounded() {
        let sink = MemoryTraceSink::new(2);
        sink.record(&event(TraceEventKind::DirectiveReceived)).unwrap();
        sink.record(&event(TraceEventKind::VersionResolved)).unwrap();
        sink.record(&event(TraceEventKind::ApplyStarted)).unwrap();

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.kinds()[0], TraceEventKind::VersionResolved);
    }

    #[test]
    fn test_file_sink_writes_json_lines() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FileTraceSink::create_in(temp_dir.path()).unwrap();

        sink.record(
            &event(TraceEventKind::VersionResolved)
                .resolved(Resolution::Version(2))
                .outcome(TraceOutcome::Success),
        )
        .unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert!(content.contains("\"kind\":\"version_resolved\""));
        assert!(content.contains("\"outcome\":\"success\""));
        assert!(sink.path().extension().map(|e| e == "log").unwrap_or(false));
    }

    #[test]
    fn test_composite_delivers_past_broken_sink() {
        let memory = std::sync::Arc::new(MemoryTraceSink::default());
        let sink = CompositeSink::new()
            .with(BrokenSink)
            .with(memory.clone());

        let result = sink.record(&event(TraceEventKind::ApplyStarted));

        assert!(result.is_err());
        assert_eq!(memory.count(), 1);
    }
}
