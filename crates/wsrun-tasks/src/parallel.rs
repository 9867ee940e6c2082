//! Concurrency bound resolution
//!
//! Turns a user-facing parallelism specifier (`4`, `"50%"`, `"auto"`,
//! `"default"`, `"unbounded"`) into a concrete [`ParallelMax`].

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable consulted for the `default` keyword
pub const PARALLEL_DEFAULT_ENV: &str = "WSRUN_PARALLEL_DEFAULT";

/// Environment variable injected into every running script
pub const PARALLEL_MAX_ENV: &str = "WSRUN_PARALLEL_MAX";

/// A parallelism specifier as written by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParallelSpec {
    /// A specific number of concurrent scripts
    Count(i64),
    /// Keyword or percentage form
    Keyword(String),
}

impl ParallelSpec {
    /// The `default` keyword
    pub fn default_keyword() -> Self {
        Self::Keyword("default".to_string())
    }

    /// Resolve against the host CPU count and the process environment
    pub fn resolve(&self) -> Result<ParallelMax, ParallelError> {
        let env_default = std::env::var(PARALLEL_DEFAULT_ENV).ok();
        resolve_with(self, available_cpus(), env_default.as_deref())
    }
}

impl FromStr for ParallelSpec {
    type Err = ParallelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParallelError::InvalidParallelValue(s.to_string()));
        }
        match trimmed.parse::<i64>() {
            Ok(n) => Ok(Self::Count(n)),
            Err(_) => Ok(Self::Keyword(trimmed.to_string())),
        }
    }
}

impl fmt::Display for ParallelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{}", n),
            Self::Keyword(k) => f.write_str(k),
        }
    }
}

/// A resolved concurrency bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelMax {
    /// At most this many scripts run at once
    Limited(NonZeroUsize),
    /// Every ready script starts immediately
    Unbounded,
}

impl ParallelMax {
    /// Strictly sequential execution
    pub const SEQUENTIAL: Self = Self::Limited(NonZeroUsize::MIN);

    /// Create a limited bound, `None` if `n` is zero
    pub fn limited(n: usize) -> Option<Self> {
        NonZeroUsize::new(n).map(Self::Limited)
    }

    /// Whether `running` scripts leave room for another one
    pub fn has_capacity(&self, running: usize) -> bool {
        match self {
            Self::Limited(max) => running < max.get(),
            Self::Unbounded => true,
        }
    }

    /// The number of scripts that will actually run side by side for a batch of `count`
    pub fn batch_size(&self, count: usize) -> usize {
        match self {
            Self::Limited(max) => max.get().min(count),
            Self::Unbounded => count,
        }
    }
}

impl fmt::Display for ParallelMax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(n) => write!(f, "{}", n),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Errors while resolving a parallelism specifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParallelError {
    /// The value is not a positive count, a percentage in (0, 100], or a known keyword
    #[error("Invalid parallel value '{0}': expected a positive integer, a percentage in (0%, 100%], or one of: default, auto, unbounded")]
    InvalidParallelValue(String),
}

/// Number of logical CPUs available to this process
pub fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Resolve a specifier against an explicit CPU count and `default` override
pub fn resolve_with(
    spec: &ParallelSpec,
    cpus: usize,
    env_default: Option<&str>,
) -> Result<ParallelMax, ParallelError> {
    resolve_inner(spec, cpus.max(1), env_default, true)
}

fn resolve_inner(
    spec: &ParallelSpec,
    cpus: usize,
    env_default: Option<&str>,
    allow_default: bool,
) -> Result<ParallelMax, ParallelError> {
    let auto = ParallelMax::limited(cpus).unwrap_or(ParallelMax::SEQUENTIAL);

    let keyword = match spec {
        ParallelSpec::Count(n) => {
            return usize::try_from(*n)
                .ok()
                .and_then(ParallelMax::limited)
                .ok_or_else(|| ParallelError::InvalidParallelValue(n.to_string()));
        }
        ParallelSpec::Keyword(k) => k.as_str(),
    };

    match keyword {
        "unbounded" => Ok(ParallelMax::Unbounded),
        "auto" => Ok(auto),
        "default" if !allow_default => Ok(auto),
        "default" => match env_default.map(str::trim).filter(|v| !v.is_empty()) {
            Some(value) => {
                debug!(value, "using {} for default parallelism", PARALLEL_DEFAULT_ENV);
                let nested: ParallelSpec = value.parse()?;
                resolve_inner(&nested, cpus, None, false)
            }
            None => Ok(auto),
        },
        other => match other.strip_suffix('%') {
            Some(number) => resolve_percentage(other, number, cpus),
            None => match other.parse::<i64>() {
                Ok(n) => resolve_inner(&ParallelSpec::Count(n), cpus, env_default, allow_default),
                Err(_) => Err(ParallelError::InvalidParallelValue(other.to_string())),
            },
        },
    }
}

fn resolve_percentage(raw: &str, number: &str, cpus: usize) -> Result<ParallelMax, ParallelError> {
    let percent: f64 = number
        .trim()
        .parse()
        .map_err(|_| ParallelError::InvalidParallelValue(raw.to_string()))?;

    // also rejects NaN
    if !(percent > 0.0 && percent <= 100.0) {
        return Err(ParallelError::InvalidParallelValue(raw.to_string()));
    }

    let scaled = ((cpus as f64) * percent / 100.0).floor() as usize;
    Ok(ParallelMax::limited(scaled.max(1)).unwrap_or(ParallelMax::SEQUENTIAL))
}
