//! Per-scheme count overrides and the volume fallback hook.
//!
//! # Responsibility
//! - Let a scheme opt out of default +1/-1 arithmetic.
//! - Let an integrator take over the volume-guard fallback.
//!
//! # Invariants
//! - At most one override per scheme name.
//! - Scheme names are lowercase ASCII letters, digits, `_` or `-`, 1..=32 chars.

use crate::model::category::CategoryId;
use crate::model::item::Item;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

static SCHEME_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_-]{1,32}$").expect("valid scheme name regex"));

/// Custom counting strategy for one scheme.
pub trait SchemeOverride: Send + Sync {
    /// Scheme this override owns.
    fn scheme(&self) -> &str;
    /// Brings the counts of the listed categories up to date.
    fn update_counts(&self, category_ids: &[CategoryId]) -> Result<(), String>;
}

/// Integrator hook consulted when the volume guard trips.
pub trait FallbackStrategy: Send + Sync {
    /// Handles an item with too many dependents, or declines.
    fn handle(&self, item: &Item, dependent_count: usize) -> Result<FallbackOutcome, String>;
}

/// Result of a [`FallbackStrategy`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackOutcome {
    /// The strategy fully accounted for the item and its subtree.
    Handled,
    /// Use the default whole-subtree recount.
    Declined,
}

/// Override registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideRegistryError {
    InvalidScheme(String),
    DuplicateScheme(String),
}

impl Display for OverrideRegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidScheme(value) => write!(f, "scheme name is invalid: `{value}`"),
            Self::DuplicateScheme(value) => {
                write!(f, "count override already registered for scheme `{value}`")
            }
        }
    }
}

impl Error for OverrideRegistryError {}

/// Capability lookup of per-scheme overrides.
#[derive(Default, Clone)]
pub struct OverrideRegistry {
    overrides: BTreeMap<String, Arc<dyn SchemeOverride>>,
}

impl OverrideRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the override for its scheme.
    pub fn register(
        &mut self,
        scheme_override: Arc<dyn SchemeOverride>,
    ) -> Result<(), OverrideRegistryError> {
        let scheme = scheme_override.scheme().to_string();
        if !is_valid_scheme_name(&scheme) {
            return Err(OverrideRegistryError::InvalidScheme(scheme));
        }
        if self.overrides.contains_key(&scheme) {
            return Err(OverrideRegistryError::DuplicateScheme(scheme));
        }
        self.overrides.insert(scheme, scheme_override);
        Ok(())
    }

    pub fn scheme_has_override(&self, scheme: &str) -> bool {
        self.overrides.contains_key(scheme)
    }

    /// Delegates to the scheme's override.
    ///
    /// Returns `Ok(false)` when no override is registered for `scheme`.
    pub fn invoke_override(
        &self,
        category_ids: &[CategoryId],
        scheme: &str,
    ) -> Result<bool, String> {
        match self.overrides.get(scheme) {
            Some(scheme_override) => scheme_override.update_counts(category_ids).map(|()| true),
            None => Ok(false),
        }
    }

    /// Sorted scheme names with a registered override.
    pub fn schemes(&self) -> Vec<String> {
        self.overrides.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

/// Returns whether `value` is a well-formed scheme name.
pub fn is_valid_scheme_name(value: &str) -> bool {
    SCHEME_NAME_RE.is_match(value)
}
