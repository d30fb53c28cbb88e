//! # Target Directives
//!
//! Where the caller wants the schema to end up, and the token grammar used
//! to say so on the command line:
//!
//! | Token          | Directive                     |
//! |----------------|-------------------------------|
//! | `to:<version>` | `Absolute(version)`           |
//! | `tag:<name>`   | `Tag(name)`                   |
//! | `up[:<n>]`     | `RelativeStep(Up, n)`, n = 1  |
//! | `down[:<n>]`   | `RelativeStep(Down, n)`, n = 1|
//! | (none)         | `Latest`                      |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::{MigrationError, MigrationResult};
use super::MigrationVersion;

/// Stepping direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    /// Sign applied to a step count
    pub fn sign(&self) -> i64 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
        }
    }
}

/// The caller's description of the desired end state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetDirective {
    /// Migrate to the newest unit
    Latest,
    /// Migrate to exactly this version
    Absolute(MigrationVersion),
    /// Migrate to the lowest unit carrying this tag
    Tag(String),
    /// Move `count` units from the applied position
    RelativeStep { direction: Direction, count: u32 },
}

impl TargetDirective {
    /// Step up `count` units; a count of 0 is taken as 1
    pub fn up(count: u32) -> Self {
        Self::step(Direction::Up, count)
    }

    /// Step down `count` units; a count of 0 is taken as 1
    pub fn down(count: u32) -> Self {
        Self::step(Direction::Down, count)
    }

    fn step(direction: Direction, count: u32) -> Self {
        Self::RelativeStep {
            direction,
            count: count.max(1),
        }
    }
}

impl fmt::Display for TargetDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::Absolute(v) => write!(f, "to:{}", v),
            Self::Tag(name) => write!(f, "tag:{}", name),
            Self::RelativeStep { direction, count } => {
                write!(f, "{}:{}", direction.as_str(), count)
            }
        }
    }
}

impl FromStr for TargetDirective {
    type Err = MigrationError;

    /// Parse a single addressing token
    fn from_str(token: &str) -> MigrationResult<Self> {
        let invalid = |reason: &str| MigrationError::InvalidDirective {
            token: token.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = token.splitn(2, ':');
        let key = parts.next().unwrap_or("").trim();
        let value = parts.next().map(str::trim);

        if value.map(|v| v.contains(':')).unwrap_or(false) {
            return Err(invalid("expected a single ':' separator"));
        }

        match key {
            "to" => {
                let value = value
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| invalid("missing version"))?;
                value
                    .parse::<MigrationVersion>()
                    .map(Self::Absolute)
                    .map_err(|_| invalid("version must be a non-negative integer"))
            }
            "tag" => {
                let value = value
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| invalid("missing tag"))?;
                Ok(Self::Tag(value.to_string()))
            }
            "up" | "down" => {
                let direction = if key == "up" {
                    Direction::Up
                } else {
                    Direction::Down
                };
                let count = match value {
                    None | Some("") => 1,
                    Some(v) => v
                        .parse::<u32>()
                        .map_err(|_| invalid("step count must be a positive integer"))?,
                };
                if count == 0 {
                    return Err(invalid("step count must be at least 1"));
                }
                Ok(Self::RelativeStep { direction, count })
            }
            _ => Err(invalid("unknown command")),
        }
    }
}

/// How to treat more than one addressing token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectivePolicy {
    /// Reject with `ConflictingDirective`
    #[default]
    Strict,
    /// A tag always wins; otherwise the last token wins
    LastWins,
}

/// Folds command-line tokens into one directive
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectiveParser {
    policy: DirectivePolicy,
}

impl DirectiveParser {
    pub fn new(policy: DirectivePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DirectivePolicy {
        self.policy
    }

    pub fn parse<S: AsRef<str>>(&self, tokens: &[S]) -> MigrationResult<TargetDirective> {
        let mut parsed: Vec<(&str, TargetDirective)> = Vec::with_capacity(tokens.len());
        for token in tokens {
            let token = token.as_ref();
            parsed.push((token, token.parse()?));
        }

        match self.policy {
            DirectivePolicy::Strict => {
                if let [first, second, ..] = parsed.as_slice() {
                    return Err(MigrationError::ConflictingDirective {
                        first: first.0.to_string(),
                        second: second.0.to_string(),
                    });
                }
                Ok(parsed
                    .pop()
                    .map(|(_, d)| d)
                    .unwrap_or(TargetDirective::Latest))
            }
            DirectivePolicy::LastWins => {
                let last_tag = parsed
                    .iter()
                    .rev()
                    .find(|(_, d)| matches!(d, TargetDirective::Tag(_)))
                    .map(|(_, d)| d.clone());
                Ok(last_tag
                    .or_else(|| parsed.pop().map(|(_, d)| d))
                    .unwrap_or(TargetDirective::Latest))
            }
        }
    }
}
