//! aeromigrate binary
//!
//! Logging goes to stderr and is filtered by `RUST_LOG` (default `warn`).

use aeromigrate::cli::{self, io::write_error};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run() {
        let _ = write_error(e.code(), e.message());
        std::process::exit(e.exit_code());
    }
}
