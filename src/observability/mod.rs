//! # Observability
//!
//! Structured run tracing for migration runs.

pub mod trace;

pub use trace::{
    CompositeSink, FileTraceSink, MemoryTraceSink, SinkError, TraceEvent, TraceEventKind,
    TraceOutcome, TraceSink, TracingSink,
};
