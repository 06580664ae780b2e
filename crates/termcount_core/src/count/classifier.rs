//! Counted-status membership test.

use std::collections::BTreeSet;

/// Decides whether a status contributes to category counts.
///
/// Exact string equality only. An empty set counts nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusClassifier {
    counted: BTreeSet<String>,
}

impl StatusClassifier {
    pub fn new(counted: BTreeSet<String>) -> Self {
        Self { counted }
    }

    pub fn is_counted(&self, status: &str) -> bool {
        self.counted.contains(status)
    }

    /// Returns whether no status is counted (every transition is a no-op).
    pub fn is_empty(&self) -> bool {
        self.counted.is_empty()
    }

    /// Counted statuses in ascending order.
    pub fn counted_statuses(&self) -> impl Iterator<Item = &str> {
        self.counted.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for StatusClassifier {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}
