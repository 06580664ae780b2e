//! Counting configuration and its process-wide holder.
//!
//! # Responsibility
//! - Define which statuses are counted and how many dependents may be
//!   reconciled incrementally.
//! - Apply optional overrides (typically loaded from JSON) on top of defaults.
//! - Hand out immutable snapshots so a running session never observes a reload.
//!
//! # Invariants
//! - An empty counted-status set is valid; every transition is then a no-op.
//! - `dependent_volume_limit` is either unlimited (`-1`) or non-negative.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, RwLock};

/// Default counted status.
pub const DEFAULT_COUNTED_STATUS: &str = "published";
/// Default number of dependents reconciled incrementally before fallback.
pub const DEFAULT_DEPENDENT_VOLUME_LIMIT: u32 = 1000;
/// Default item kind that never carries dependents of its own.
pub const DEFAULT_LEAF_KIND: &str = "attachment";

const UNLIMITED_RAW: i64 = -1;

/// Upper bound on dependents processed incrementally for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeLimit {
    Unlimited,
    Max(u32),
}

impl VolumeLimit {
    /// Parses the raw configuration value (`-1` means unlimited).
    pub fn from_raw(value: i64) -> Result<Self, ConfigError> {
        if value == UNLIMITED_RAW {
            return Ok(Self::Unlimited);
        }
        u32::try_from(value)
            .map(Self::Max)
            .map_err(|_| ConfigError::InvalidVolumeLimit(value))
    }

    /// Raw configuration value (`-1` for unlimited).
    pub fn as_raw(self) -> i64 {
        match self {
            Self::Unlimited => UNLIMITED_RAW,
            Self::Max(limit) => i64::from(limit),
        }
    }
}

impl Default for VolumeLimit {
    fn default() -> Self {
        Self::Max(DEFAULT_DEPENDENT_VOLUME_LIMIT)
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    InvalidVolumeLimit(i64),
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidVolumeLimit(value) => write!(
                f,
                "dependent_volume_limit must be -1 (unlimited) or a non-negative u32, got {value}"
            ),
            Self::Parse(err) => write!(f, "invalid counting config overrides: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidVolumeLimit(_) => None,
            Self::Parse(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Effective counting configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountingConfig {
    /// Statuses that contribute to category counts. Exact string match.
    pub counted_statuses: BTreeSet<String>,
    pub dependent_volume_limit: VolumeLimit,
    /// Item kinds that are never expanded for dependents.
    pub leaf_kinds: BTreeSet<String>,
}

impl Default for CountingConfig {
    fn default() -> Self {
        Self {
            counted_statuses: BTreeSet::from([DEFAULT_COUNTED_STATUS.to_string()]),
            dependent_volume_limit: VolumeLimit::default(),
            leaf_kinds: BTreeSet::from([DEFAULT_LEAF_KIND.to_string()]),
        }
    }
}

/// Partial configuration; every present field replaces the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    pub counted_statuses: Option<Vec<String>>,
    pub dependent_volume_limit: Option<i64>,
    pub leaf_kinds: Option<Vec<String>>,
}

impl CountingConfig {
    /// Returns a copy of `self` with the provided overrides applied.
    ///
    /// # Errors
    /// - Returns `InvalidVolumeLimit` for limits below `-1` or above `u32::MAX`.
    pub fn with_overrides(&self, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let mut next = self.clone();
        if let Some(statuses) = overrides.counted_statuses {
            next.counted_statuses = statuses.into_iter().collect();
        }
        if let Some(raw) = overrides.dependent_volume_limit {
            next.dependent_volume_limit = VolumeLimit::from_raw(raw)?;
        }
        if let Some(kinds) = overrides.leaf_kinds {
            next.leaf_kinds = kinds.into_iter().collect();
        }
        Ok(next)
    }

    /// Builds a config from defaults plus a JSON overrides document.
    pub fn from_json_overrides(json: &str) -> Result<Self, ConfigError> {
        let overrides: ConfigOverrides = serde_json::from_str(json)?;
        Self::default().with_overrides(overrides)
    }

    /// Sets the counted statuses.
    pub fn counted<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.counted_statuses = statuses.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the dependent volume limit.
    pub fn volume_limit(mut self, limit: VolumeLimit) -> Self {
        self.dependent_volume_limit = limit;
        self
    }
}

/// Process-wide configuration holder.
///
/// Cloning shares the same underlying slot. Readers take an `Arc` snapshot;
/// `replace` swaps the slot without affecting snapshots already handed out.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<CountingConfig>>>,
}

impl SharedConfig {
    pub fn new(config: CountingConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Returns the current configuration snapshot.
    pub fn snapshot(&self) -> Arc<CountingConfig> {
        // A poisoned lock still holds a fully-written `Arc`; keep serving it.
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replaces the configuration for sessions started from now on.
    pub fn replace(&self, config: CountingConfig) {
        let next = Arc::new(config);
        match self.inner.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}
