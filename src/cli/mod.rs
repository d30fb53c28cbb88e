//! Command-line interface
//!
//! `aeromigrate run <target> [directive...]` and `aeromigrate status <target>`.
//! Every command writes one JSON document: the response on stdout, or an
//! error on stderr with a non-zero exit code.

pub mod args;
pub mod commands;
pub mod errors;
pub mod io;

pub use args::{Cli, Command};
pub use commands::{run, run_command};
pub use errors::{CliError, CliResult};
