//! # Version Resolver
//!
//! Turns a directive, the catalog and the applied state into one concrete
//! target version, or an explicit no-op.
//!
//! Relative steps never fail on bounds: stepping below the first unit is a
//! no-op and stepping past the newest unit lands on the newest unit.

use serde::Serialize;

use super::catalog::MigrationCatalog;
use super::directive::TargetDirective;
use super::errors::{MigrationError, MigrationResult};
use super::state::AppliedState;
use super::MigrationVersion;

/// Resolved target of a run
///
/// `NoOp` is never encoded as version 0: `to:0` is a legitimate
/// "revert everything" target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "version")]
pub enum Resolution {
    Version(MigrationVersion),
    NoOp,
}

impl Resolution {
    pub fn version(&self) -> Option<MigrationVersion> {
        match self {
            Resolution::Version(v) => Some(*v),
            Resolution::NoOp => None,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Resolution::NoOp)
    }
}

/// Catalog position a relative step was measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Nothing applied yet
    Fresh,
    /// Applied version found at this index
    Index(usize),
    /// Applied version missing from the catalog; stepped from before index 0
    Drifted { version: MigrationVersion },
}

impl StartPosition {
    fn as_offset(&self) -> i64 {
        match self {
            StartPosition::Index(i) => *i as i64,
            StartPosition::Fresh | StartPosition::Drifted { .. } => -1,
        }
    }
}

/// Resolution plus how it was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionOutcome {
    pub resolution: Resolution,
    /// Set only for relative steps
    pub start: Option<StartPosition>,
}

impl ResolutionOutcome {
    fn absolute(resolution: Resolution) -> Self {
        Self {
            resolution,
            start: None,
        }
    }

    pub fn is_drifted(&self) -> bool {
        matches!(self.start, Some(StartPosition::Drifted { .. }))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolverOptions {
    /// Fail with `DriftedState` instead of stepping from before index 0
    pub strict_drift: bool,
}

/// Resolve `directive` against `catalog` and the applied state
pub fn resolve(
    directive: &TargetDirective,
    catalog: &MigrationCatalog,
    current: &AppliedState,
    options: ResolverOptions,
) -> MigrationResult<ResolutionOutcome> {
    match directive {
        // Not checked against the catalog; the engine reports unknown versions.
        TargetDirective::Absolute(v) => Ok(ResolutionOutcome::absolute(Resolution::Version(*v))),

        TargetDirective::Tag(name) => catalog
            .resolve_tag(name)
            .map(|v| ResolutionOutcome::absolute(Resolution::Version(v)))
            .ok_or_else(|| MigrationError::UnknownTag { tag: name.clone() }),

        TargetDirective::Latest => Ok(ResolutionOutcome::absolute(
            catalog
                .latest()
                .map(|u| Resolution::Version(u.version))
                .unwrap_or(Resolution::NoOp),
        )),

        TargetDirective::RelativeStep { direction, count } => {
            if catalog.is_empty() {
                return Err(MigrationError::EmptyCatalog);
            }

            let start = start_position(catalog, current.current_version);
            if let StartPosition::Drifted { version } = start {
                if options.strict_drift {
                    return Err(MigrationError::DriftedState { version });
                }
            }

            let offset = i64::from(*count) * direction.sign();
            let target_index = start.as_offset() + offset;
            let last_index = catalog.len() as i64 - 1;

            let resolution = if target_index < 0 {
                Resolution::NoOp
            } else {
                let index = target_index.min(last_index) as usize;
                Resolution::Version(catalog.all()[index].version)
            };

            Ok(ResolutionOutcome {
                resolution,
                start: Some(start),
            })
        }
    }
}

fn start_position(catalog: &MigrationCatalog, current: MigrationVersion) -> StartPosition {
    if current == 0 {
        return StartPosition::Fresh;
    }

    catalog
        .all()
        .iter()
        .position(|u| u.version == current)
        .map(StartPosition::Index)
        .unwrap_or(StartPosition::Drifted { version: current })
}
