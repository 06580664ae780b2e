//! Dependent-item discovery and status inheritance.
//!
//! # Responsibility
//! - Materialize the inheriting children of an item before any mutation.
//! - Resolve the effective status of a single item (own or inherited).
//!
//! # Invariants
//! - Output order is the store's order (ascending id).
//! - Leaf kinds are never expanded.
//! - Children with their own lifecycle status are excluded; their transitions
//!   arrive as separate events.

use crate::model::item::{Item, StatusSource};
use crate::store::{ContentStore, StoreResult};
use std::collections::BTreeSet;

const MAX_INHERITANCE_DEPTH: usize = 16;

/// A child item whose status is taken from its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentItem {
    pub item: Item,
    pub status: StatusSource,
}

/// Returns the inheriting dependents of `item`.
///
/// `parent_status` is the parent's current status; each dependent carries it
/// as `StatusSource::Inherited`.
pub fn expand<C: ContentStore + ?Sized>(
    content: &C,
    item: &Item,
    parent_status: &str,
    leaf_kinds: &BTreeSet<String>,
) -> StoreResult<Vec<DependentItem>> {
    if leaf_kinds.contains(&item.kind) {
        return Ok(Vec::new());
    }

    let dependents = content
        .get_dependents(item.id)?
        .into_iter()
        .filter(Item::inherits_status)
        .map(|child| DependentItem {
            item: child,
            status: StatusSource::Inherited(parent_status.to_string()),
        })
        .collect();
    Ok(dependents)
}

/// Resolves the status used to classify `item` right now.
///
/// An inheriting item whose parent is missing keeps its literal status.
pub fn effective_status<C: ContentStore + ?Sized>(
    content: &C,
    item: &Item,
) -> StoreResult<StatusSource> {
    let mut current = item.clone();
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if !current.inherits_status() {
            return Ok(if current.id == item.id {
                StatusSource::Own(current.status)
            } else {
                StatusSource::Inherited(current.status)
            });
        }
        let Some(parent_id) = current.parent_id else {
            break;
        };
        match content.get_item(parent_id)? {
            Some(parent) => current = parent,
            None => break,
        }
    }

    // Orphaned (or cyclic) inheritance resolves to the literal `inherit`.
    if current.inherits_status() {
        return Ok(StatusSource::Own(item.status.clone()));
    }
    Ok(StatusSource::Inherited(current.status))
}
