//! Category-instance identifiers and count directions.

use std::fmt::{Display, Formatter};

/// Key of one category-instance (a term within a classification scheme).
pub type CategoryId = i64;

/// Direction of a single-step count change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    Increment,
    Decrement,
}

impl Direction {
    /// Stable string id used in log events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Increment => "increment",
            Self::Decrement => "decrement",
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of resolving an old/new status pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Increment,
    Decrement,
    NoOp,
}

impl Transition {
    /// Count direction for this transition, `None` for a no-op.
    pub fn direction(self) -> Option<Direction> {
        match self {
            Self::Increment => Some(Direction::Increment),
            Self::Decrement => Some(Direction::Decrement),
            Self::NoOp => None,
        }
    }
}
