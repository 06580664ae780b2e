//! Old/new status pair resolution.

use crate::count::classifier::StatusClassifier;
use crate::model::category::Transition;

/// Resolves the count movement for a status change.
///
/// Total and pure: increment when entering the counted set, decrement when
/// leaving it, no-op otherwise.
pub fn resolve(classifier: &StatusClassifier, old_status: &str, new_status: &str) -> Transition {
    match (
        classifier.is_counted(old_status),
        classifier.is_counted(new_status),
    ) {
        (false, true) => Transition::Increment,
        (true, false) => Transition::Decrement,
        _ => Transition::NoOp,
    }
}
