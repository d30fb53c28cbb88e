//! JSON output for CLI commands

use serde_json::{json, Value};
use std::io::Write;

use super::errors::{CliError, CliResult};

/// Write a response document to stdout
pub fn write_response(value: Value) -> CliResult<()> {
    write_json(&mut std::io::stdout().lock(), &value)
}

/// Write an error document to stderr
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let value = json!({
        "error": {
            "code": code,
            "message": message,
        }
    });
    write_json(&mut std::io::stderr().lock(), &value)
}

pub fn write_json<W: Write>(out: &mut W, value: &Value) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::io_error(format!("Failed to encode output: {}", e)))?;
    writeln!(out, "{}", text)
        .map_err(|e| CliError::io_error(format!("Failed to write output: {}", e)))
}
