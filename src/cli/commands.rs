//! CLI command implementations
//!
//! Each command loads the configuration, resolves the named target and runs
//! exactly one migration pass or status query against it.

use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, TargetConfig};
use crate::migrations::{
    DirectiveParser, JournalExecutor, LedgerEngine, LedgerStore, ManifestLoader, Migrator,
    Resolution,
};
use crate::observability::{CompositeSink, FileTraceSink, MemoryTraceSink, TracingSink};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{write_json, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(&cli.config, cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(config_path: &Path, cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Run {
            target,
            directives,
            trace,
        } => migrate(config_path, &target, &directives, trace),
        Command::Status { target } => status(config_path, &target),
    }
}

/// Split `trace` / `trace:<bool>` tokens out of the directive list
fn split_trace_tokens(tokens: &[String]) -> CliResult<(Option<bool>, Vec<String>)> {
    let mut trace = None;
    let mut directives = Vec::with_capacity(tokens.len());

    for token in tokens {
        match token.trim() {
            "trace" => trace = Some(true),
            t if t.starts_with("trace:") => {
                let value = &t["trace:".len()..];
                let enabled = value.parse::<bool>().map_err(|_| {
                    CliError::invalid_argument(format!("Invalid argument: \"{}\"", token))
                })?;
                trace = Some(enabled);
            }
            _ => directives.push(token.clone()),
        }
    }

    Ok((trace, directives))
}

fn target_config<'a>(config: &'a Config, target: &str) -> CliResult<&'a TargetConfig> {
    config
        .target(target)
        .ok_or_else(|| CliError::invalid_target(target))
}

fn manifest_loader(config: &Config) -> CliResult<ManifestLoader> {
    ManifestLoader::new(config.migrations_dir.clone()).map_err(CliError::from)
}

/// Migrate one target toward a directive.
///
/// Writes the run report on stdout. A failed unit still prints the report
/// before the error is returned, so the operator can see what was applied.
pub fn migrate(config_path: &Path, target: &str, tokens: &[String], trace: bool) -> CliResult<()> {
    migrate_to_writer(
        &mut std::io::stdout().lock(),
        config_path,
        target,
        tokens,
        trace,
    )
}

fn migrate_to_writer<W: Write>(
    out: &mut W,
    config_path: &Path,
    target: &str,
    tokens: &[String],
    trace: bool,
) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let target_config = target_config(&config, target)?;

    let (trace_token, directive_tokens) = split_trace_tokens(tokens)?;
    let trace = trace_token.unwrap_or(trace);

    let directive = DirectiveParser::new(config.directive_policy).parse(&directive_tokens)?;

    let events = Arc::new(MemoryTraceSink::new(config.trace_buffer));
    let mut sink = CompositeSink::new()
        .with(TracingSink)
        .with(Arc::clone(&events));
    let mut trace_file = None;
    if trace {
        match FileTraceSink::create_in(config.trace_dir()) {
            Ok(file_sink) => {
                trace_file = Some(file_sink.path().display().to_string());
                sink = sink.with(file_sink);
            }
            Err(e) => warn!(error = %e, "trace file unavailable; continuing without it"),
        }
    }

    std::fs::create_dir_all(&target_config.data_dir).map_err(|e| {
        CliError::config_error(format!(
            "Failed to create data directory {:?}: {}",
            target_config.data_dir, e
        ))
    })?;

    let store = LedgerStore::new(&target_config.data_dir);
    let engine = LedgerEngine::new(store.clone(), JournalExecutor::new(&target_config.data_dir));
    let mut migrator = Migrator::new(manifest_loader(&config)?, store, engine, sink)
        .with_options(config.resolver_options());

    info!(target_name = target, directive = %directive, trace, "starting migration");
    let report = migrator.run(&directive)?;

    let applied: Vec<_> = report
        .applied
        .iter()
        .map(|s| {
            json!({
                "version": s.version,
                "name": s.name,
                "direction": s.direction,
                "duration_ms": s.duration_ms,
            })
        })
        .collect();

    let resolved = match report.target {
        Resolution::Version(v) => json!(v),
        Resolution::NoOp => json!(null),
    };

    let response = json!({
        "success": report.is_success(),
        "target": target,
        "directive": directive.to_string(),
        "run_id": report.run_id.to_string(),
        "starting_version": report.starting_version,
        "resolved_version": resolved,
        "nothing_to_do": report.is_noop(),
        "applied_count": applied.len(),
        "applied": applied,
        "failed": &report.failed,
        "trace_file": trace_file,
        "events": events.events(),
    });
    write_json(out, &response)?;

    report.into_result()?;
    Ok(())
}

/// Show the catalog against a target's applied version.
pub fn status(config_path: &Path, target: &str) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let target_config = target_config(&config, target)?;

    let store = LedgerStore::new(&target_config.data_dir);
    let engine = LedgerEngine::new(store.clone(), JournalExecutor::new(&target_config.data_dir));
    let migrator = Migrator::new(manifest_loader(&config)?, store, engine, TracingSink);

    let status = migrator.status()?;
    if status.drifted {
        warn!(
            version = status.current_version,
            "applied version is not in the migration catalog"
        );
    }

    let mut response = serde_json::to_value(&status)
        .map_err(|e| CliError::io_error(format!("Failed to encode status: {}", e)))?;
    response["target"] = json!(target);
    write_response(response)
}
