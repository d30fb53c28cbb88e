//! aeromigrate - a strict, deterministic schema-migration orchestrator
//!
//! Resolves an absolute version, a tag or a relative step against a sorted
//! catalog of migration units and the target's applied state, then drives
//! the engine there one unit at a time, stopping at the first failure.

pub mod cli;
pub mod config;
pub mod migrations;
pub mod observability;
