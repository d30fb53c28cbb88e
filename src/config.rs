//! Configuration
//!
//! Loaded once at startup from JSON or TOML (chosen by file extension) and
//! validated before any target is touched. Relative paths are resolved
//! against the directory holding the configuration file.
//!
//! ```json
//! {
//!   "migrations_dir": "./migrations",
//!   "targets": { "dev": { "data_dir": "./data/dev" } },
//!   "directive_policy": "strict",
//!   "strict_drift": false
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::migrations::{DirectivePolicy, ResolverOptions};

/// Default bound for the in-memory trace buffer
pub const DEFAULT_TRACE_BUFFER: usize = 1_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration:\n{}", format_issues(.0))]
    Invalid(Vec<ConfigIssue>),
}

/// A single rejected configuration value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub field: String,
    pub value: String,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}': {} (value: {})", self.field, self.message, self.value)
    }
}

fn format_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("  - {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A named migration target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Directory holding the target's ledger and journal
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory of unit manifests
    pub migrations_dir: PathBuf,

    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,

    #[serde(default)]
    pub directive_policy: DirectivePolicy,

    /// Fail instead of stepping from before the first unit on drifted state
    #[serde(default)]
    pub strict_drift: bool,

    /// Where `--trace` files go (default: `migrations_dir`)
    #[serde(default)]
    pub trace_dir: Option<PathBuf>,

    #[serde(default = "default_trace_buffer")]
    pub trace_buffer: usize,
}

fn default_trace_buffer() -> usize {
    DEFAULT_TRACE_BUFFER
}

impl Config {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let is_toml = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);
        let parse_err = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let mut config: Config = if is_toml {
            toml::from_str(&content).map_err(|e| parse_err(e.to_string()))?
        } else {
            serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?
        };

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &Path| {
            if p.is_relative() {
                base.join(p)
            } else {
                p.to_path_buf()
            }
        };

        self.migrations_dir = resolve(&self.migrations_dir);
        self.trace_dir = self.trace_dir.as_deref().map(resolve);
        for target in self.targets.values_mut() {
            target.data_dir = resolve(&target.data_dir);
        }
    }

    /// Reject values that would only fail later, mid-run
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Vec::new();
        let mut issue = |field: &str, value: String, message: &str| {
            issues.push(ConfigIssue {
                field: field.to_string(),
                value,
                message: message.to_string(),
            })
        };

        if self.migrations_dir.as_os_str().is_empty() {
            issue("migrations_dir", String::new(), "Value cannot be empty");
        } else if self.migrations_dir.exists() && !self.migrations_dir.is_dir() {
            issue(
                "migrations_dir",
                self.migrations_dir.display().to_string(),
                "Path is not a directory",
            );
        }

        for (name, target) in &self.targets {
            if name.trim().is_empty() {
                issue("targets", name.clone(), "Target name cannot be empty");
            }
            if target.data_dir.exists() && !target.data_dir.is_dir() {
                issue(
                    &format!("targets.{}.data_dir", name),
                    target.data_dir.display().to_string(),
                    "Path is not a directory",
                );
            }
        }

        if self.trace_buffer == 0 {
            issue("trace_buffer", "0".to_string(), "Value must be positive");
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(issues))
        }
    }

    /// Look up a target by name
    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.get(name.trim())
    }

    pub fn trace_dir(&self) -> &Path {
        self.trace_dir.as_deref().unwrap_or(&self.migrations_dir)
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            strict_drift: self.strict_drift,
        }
    }
}
