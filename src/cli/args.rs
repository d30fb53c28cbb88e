//! CLI argument definitions using clap
//!
//! Commands:
//! - aeromigrate run <target> [to:<version>|tag:<tag>|up[:<n>]|down[:<n>]] [--trace]
//! - aeromigrate status <target>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aeromigrate - resolve and apply versioned schema migrations
#[derive(Parser, Debug)]
#[command(name = "aeromigrate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (JSON or TOML)
    #[arg(long, global = true, default_value = "./aeromigrate.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Migrate a target toward a version, tag or relative step
    ///
    /// With no directive, migrates to the newest unit.
    Run {
        /// Target name from the configuration's `targets` table
        target: String,

        /// to:<version> | tag:<tag> | up[:<steps>] | down[:<steps>]
        #[arg(value_name = "DIRECTIVE")]
        directives: Vec<String>,

        /// Write a trace file for this run
        #[arg(long)]
        trace: bool,
    },

    /// Show the catalog against the target's applied version
    Status {
        /// Target name from the configuration's `targets` table
        target: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
