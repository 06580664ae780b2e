//! Dependent volume guard.

use crate::config::VolumeLimit;

/// Whether the incremental path may run for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    Fallback,
}

/// Falls back once the dependent count strictly exceeds a bounded limit.
pub fn check(dependent_count: usize, limit: VolumeLimit) -> GuardDecision {
    match limit {
        VolumeLimit::Unlimited => GuardDecision::Proceed,
        VolumeLimit::Max(max) if dependent_count > max as usize => GuardDecision::Fallback,
        VolumeLimit::Max(_) => GuardDecision::Proceed,
    }
}
